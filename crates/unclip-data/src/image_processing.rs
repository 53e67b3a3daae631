//! Image preprocessing for the conditioning and target views.
//!
//! Both views are computed from the same decoded image:
//! - the conditioning view follows the CLIP recipe (shortest-side resize,
//!   center crop, mean/std normalization);
//! - the target view is the largest centered square resized to the model
//!   resolution and scaled to `[-1, 1]`.
//!
//! All outputs are channel-first `[3, H, W]` `f32` arrays.

use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array3;
use std::path::Path;
use unclip_core::{Result, UnclipError};

/// CLIP normalization mean (RGB).
#[allow(clippy::excessive_precision)]
pub const CLIP_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
/// CLIP normalization standard deviation (RGB).
#[allow(clippy::excessive_precision)]
pub const CLIP_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Open and decode an image file.
pub fn open_image(path: impl AsRef<Path>) -> Result<DynamicImage> {
    let path = path.as_ref();
    image::open(path).map_err(|e| UnclipError::ImageDecode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Offset that centers a window of `size` inside `extent`, rounding half to even.
fn centered_offset(extent: u32, size: u32) -> u32 {
    (f64::from(extent.saturating_sub(size)) / 2.0).round_ties_even() as u32
}

/// Crop the largest centered square.
pub fn center_crop_square(img: &DynamicImage) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    let side = width.min(height);
    img.crop_imm(
        centered_offset(width, side),
        centered_offset(height, side),
        side,
        side,
    )
}

/// Resize so the shorter side equals `size`, keeping the aspect ratio.
///
/// The longer side is truncated, not rounded.
pub fn resize_shortest_side(img: &DynamicImage, size: u32, filter: FilterType) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    let (short, long) = if width <= height {
        (width, height)
    } else {
        (height, width)
    };
    let new_long = (u64::from(size) * u64::from(long) / u64::from(short.max(1))) as u32;
    let (new_w, new_h) = if width <= height {
        (size, new_long)
    } else {
        (new_long, size)
    };
    img.resize_exact(new_w, new_h, filter)
}

/// Lay out an RGB image channel-first, mapping each byte through `f(channel, value)`.
fn to_chw(rgb: &RgbImage, f: impl Fn(usize, f32) -> f32) -> Result<Array3<f32>> {
    let width = rgb.width() as usize;
    let height = rgb.height() as usize;
    let num_pixels = height * width;
    let pixels = rgb.as_raw();

    let mut data = Vec::with_capacity(3 * num_pixels);
    for c in 0..3 {
        // Pixels are interleaved [R, G, B, R, G, B, ...]
        data.extend((0..num_pixels).map(|i| f(c, pixels[i * 3 + c] as f32)));
    }

    Array3::from_shape_vec((3, height, width), data).map_err(|_| UnclipError::ShapeMismatch {
        expected: vec![3, height, width],
        actual: vec![3 * num_pixels],
    })
}

/// Configuration for the conditioning image processor.
#[derive(Debug, Clone)]
pub struct ClipImageProcessorConfig {
    /// Edge of the square output.
    pub size: u32,
    /// Normalization mean (RGB).
    pub mean: [f32; 3],
    /// Normalization standard deviation (RGB).
    pub std: [f32; 3],
    /// Rescaling factor applied before normalization.
    pub rescale_factor: f32,
    /// Resampling filter for the resize.
    pub filter: FilterType,
}

impl Default for ClipImageProcessorConfig {
    fn default() -> Self {
        Self {
            size: 224,
            mean: CLIP_MEAN,
            std: CLIP_STD,
            rescale_factor: 1.0 / 255.0,
            filter: FilterType::CatmullRom,
        }
    }
}

/// Conditioning (CLIP) view: shortest-side resize, center crop, normalize.
#[derive(Debug, Clone)]
pub struct ClipImageProcessor {
    config: ClipImageProcessorConfig,
}

impl ClipImageProcessor {
    /// Create a new processor.
    pub fn new(config: ClipImageProcessorConfig) -> Self {
        Self { config }
    }

    /// Processor with CLIP statistics and the given output edge.
    pub fn with_size(size: u32) -> Self {
        Self::new(ClipImageProcessorConfig {
            size,
            ..Default::default()
        })
    }

    /// Process a decoded image into a `[3, size, size]` normalized array.
    pub fn process_image(&self, img: &DynamicImage) -> Result<Array3<f32>> {
        let size = self.config.size;
        let resized = resize_shortest_side(img, size, self.config.filter);
        let cropped = resized.crop_imm(
            centered_offset(resized.width(), size),
            centered_offset(resized.height(), size),
            size,
            size,
        );
        let rgb = cropped.to_rgb8();

        let ClipImageProcessorConfig {
            mean,
            std,
            rescale_factor,
            ..
        } = self.config;
        to_chw(&rgb, |c, v| (v * rescale_factor - mean[c]) / std[c])
    }

    /// The all-zero array used when the conditioning image is dropped.
    pub fn zeros(&self) -> Array3<f32> {
        let size = self.config.size as usize;
        Array3::zeros((3, size, size))
    }
}

/// Target view: largest centered square, resized, scaled to `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct TargetImageProcessor {
    size: u32,
    filter: FilterType,
}

impl TargetImageProcessor {
    /// Processor producing `[3, size, size]` arrays with bicubic resampling.
    pub fn new(size: u32) -> Self {
        Self {
            size,
            filter: FilterType::CatmullRom,
        }
    }

    /// Process a decoded image.
    pub fn process_image(&self, img: &DynamicImage) -> Result<Array3<f32>> {
        let square = center_crop_square(img);
        let resized = square.resize_exact(self.size, self.size, self.filter);
        to_chw(&resized.to_rgb8(), |_, v| v / 127.5 - 1.0)
    }
}
