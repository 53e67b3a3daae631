//! Image/caption dataset handling for text-to-image diffusion training.
//!
//! This crate provides:
//! - Record table loading from CSV, TSV and Parquet files
//! - CLIP-style conditioning and target image preprocessing
//! - Fixed-length caption tokenization
//! - [`TextImageDataset`] with independent caption/image conditioning dropout
//! - [`DataLoader`] for shuffled, parallel batch assembly
//! - [`TextImageDataModule`], the train/val/test adapter for a training loop

#![warn(missing_docs)]

pub mod collator;
pub mod dataloader;
pub mod dataset;
pub mod datamodule;
pub mod image_processing;
pub mod table;
pub mod tokenizer;

pub use collator::*;
pub use dataloader::*;
pub use dataset::*;
pub use datamodule::*;
pub use image_processing::*;
pub use table::*;
pub use tokenizer::*;

pub use unclip_core::{DataModule, Dataset};
