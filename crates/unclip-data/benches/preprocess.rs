//! Benchmarks for per-sample preprocessing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, RgbImage};
use unclip_data::{ClipImageProcessor, TargetImageProcessor, Tokenizer};

fn photo(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8])
    }))
}

fn bench_clip_view(c: &mut Criterion) {
    let mut group = c.benchmark_group("clip_view");
    let img = photo(640, 480);

    for size in [224, 336] {
        let processor = ClipImageProcessor::with_size(size);
        group.bench_with_input(BenchmarkId::new("size", size), &size, |b, _| {
            b.iter(|| processor.process_image(black_box(&img)).unwrap());
        });
    }

    group.finish();
}

fn bench_target_view(c: &mut Criterion) {
    let mut group = c.benchmark_group("target_view");
    let img = photo(640, 480);

    for size in [256, 512] {
        let processor = TargetImageProcessor::new(size);
        group.bench_with_input(BenchmarkId::new("size", size), &size, |b, _| {
            b.iter(|| processor.process_image(black_box(&img)).unwrap());
        });
    }

    group.finish();
}

fn bench_tokenize(c: &mut Criterion) {
    let tokenizer = Tokenizer::from_file(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/tokenizer.json"
    ))
    .unwrap()
    .with_max_length(77)
    .unwrap();

    c.bench_function("encode_fixed_77", |b| {
        b.iter(|| {
            tokenizer
                .encode_fixed(black_box("a photo of a red ball on the mat"))
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_clip_view, bench_target_view, bench_tokenize);
criterion_main!(benches);
