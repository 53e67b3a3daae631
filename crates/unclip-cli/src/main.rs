//! unclip CLI - inspect text-to-image training data pipelines.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use unclip_core::{DataModule, DataModuleConfig};
use unclip_data::{DataLoader, TextImageBatch, TextImageDataModule, Tokenizer};

#[derive(Parser)]
#[command(name = "unclip")]
#[command(author, version, about = "Data pipeline tooling for text-to-image diffusion training", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull batches from a data module and report shapes and statistics
    Inspect {
        /// Path to the data module configuration file (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Which loader to build
        #[arg(short, long, value_enum, default_value_t = Split::Train)]
        split: Split,

        /// Number of batches to pull
        #[arg(short, long, default_value = "2")]
        batches: usize,

        /// Epoch to start from
        #[arg(long, default_value = "0")]
        epoch: u64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Tokenize a caption the way the dataset does
    Tokenize {
        /// Caption text
        text: String,

        /// Tokenizer: local tokenizer.json, directory, or Hub repo id
        #[arg(short, long, default_value = unclip_core::DEFAULT_TOKENIZER)]
        tokenizer: String,

        /// Padded/truncated sequence length
        #[arg(long, default_value = "77")]
        seq_len: usize,
    },
}

/// Loader selected by `inspect`.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Split {
    Train,
    Val,
    Test,
}

/// Aggregate statistics over the inspected batches.
#[derive(Debug, Default, Serialize)]
struct InspectReport {
    split: String,
    num_samples: usize,
    num_batches: usize,
    batches_read: usize,
    samples_read: usize,
    target_shape: Vec<usize>,
    clip_shape: Vec<usize>,
    tokens_shape: Vec<usize>,
    target_min: f32,
    target_max: f32,
    clip_min: f32,
    clip_max: f32,
    mean_caption_tokens: f64,
    text_drop_fraction: f64,
    image_drop_fraction: f64,
    distinct_records: usize,
}

impl InspectReport {
    fn new(split: Split, loader: &DataLoader) -> Self {
        Self {
            split: format!("{split:?}").to_lowercase(),
            num_samples: loader.len(),
            num_batches: loader.num_batches(),
            target_min: f32::INFINITY,
            target_max: f32::NEG_INFINITY,
            clip_min: f32::INFINITY,
            clip_max: f32::NEG_INFINITY,
            ..Default::default()
        }
    }

    fn update(&mut self, batch: &TextImageBatch, records: &mut Vec<usize>) {
        self.batches_read += 1;
        self.samples_read += batch.batch_size;
        self.target_shape = batch.target_images.shape().to_vec();
        self.clip_shape = batch.clip_images.shape().to_vec();
        self.tokens_shape = batch.tokens.shape().to_vec();

        for &v in &batch.target_images {
            self.target_min = self.target_min.min(v);
            self.target_max = self.target_max.max(v);
        }
        for &v in &batch.clip_images {
            self.clip_min = self.clip_min.min(v);
            self.clip_max = self.clip_max.max(v);
        }

        // Running sums; divided in `finish`.
        self.mean_caption_tokens += batch.mask.iter().map(|&m| f64::from(m)).sum::<f64>();
        self.text_drop_fraction += batch.text_dropped.iter().filter(|&&d| d).count() as f64;
        self.image_drop_fraction += batch.image_dropped.iter().filter(|&&d| d).count() as f64;
        records.extend_from_slice(&batch.record_indices);
    }

    fn finish(&mut self, mut records: Vec<usize>) {
        if self.samples_read > 0 {
            let n = self.samples_read as f64;
            self.mean_caption_tokens /= n;
            self.text_drop_fraction /= n;
            self.image_drop_fraction /= n;
        }
        records.sort_unstable();
        records.dedup();
        self.distinct_records = records.len();
    }

    fn print(&self) {
        println!("========================================");
        println!("  unclip data inspection ({})", self.split);
        println!("========================================");
        println!("Samples:          {}", self.num_samples);
        println!("Batches:          {}", self.num_batches);
        println!("Batches read:     {}", self.batches_read);
        println!("Samples read:     {}", self.samples_read);
        println!("Distinct rows:    {}", self.distinct_records);
        println!("Target images:    {:?}", self.target_shape);
        println!("  range:          [{:.4}, {:.4}]", self.target_min, self.target_max);
        println!("CLIP images:      {:?}", self.clip_shape);
        println!("  range:          [{:.4}, {:.4}]", self.clip_min, self.clip_max);
        println!("Tokens / mask:    {:?}", self.tokens_shape);
        println!("Mean tokens:      {:.2}", self.mean_caption_tokens);
        println!("Caption dropout:  {:.1}%", self.text_drop_fraction * 100.0);
        println!("Image dropout:    {:.1}%", self.image_drop_fraction * 100.0);
        println!("========================================");
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            config,
            split,
            batches,
            epoch,
            json,
        } => run_inspect(config, split, batches, epoch, json),
        Commands::Tokenize {
            text,
            tokenizer,
            seq_len,
        } => run_tokenize(&text, &tokenizer, seq_len),
    }
}

fn run_inspect(
    config_path: PathBuf,
    split: Split,
    batches: usize,
    epoch: u64,
    json: bool,
) -> anyhow::Result<()> {
    let config = DataModuleConfig::from_yaml_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let module = TextImageDataModule::from_config(config);

    let mut loader = match split {
        Split::Train => module.train_dataloader(),
        Split::Val => module.val_dataloader(),
        Split::Test => module.test_dataloader(),
    }
    .context("Failed to build loader")?;
    loader.set_epoch(epoch);

    let mut report = InspectReport::new(split, &loader);
    let mut records = Vec::new();
    for (i, batch) in loader.by_ref().take(batches).enumerate() {
        let batch = batch.with_context(|| format!("Batch {i} failed"))?;
        tracing::info!("Batch {}: {} samples", i, batch.batch_size);
        report.update(&batch, &mut records);
    }
    report.finish(records);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print();
    }
    Ok(())
}

fn run_tokenize(text: &str, tokenizer: &str, seq_len: usize) -> anyhow::Result<()> {
    let tokenizer = Tokenizer::from_pretrained(tokenizer, None, None)
        .with_context(|| format!("Failed to load tokenizer {tokenizer}"))?
        .with_max_length(seq_len)?;
    let encoded = tokenizer.encode_fixed(text)?;

    println!("Tokens: {:?}", encoded.ids);
    println!("Mask:   {:?}", encoded.attention_mask);
    println!("Length: {} ({} real)", encoded.ids.len(), encoded.num_tokens());
    Ok(())
}
