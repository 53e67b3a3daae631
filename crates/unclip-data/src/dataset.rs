//! Text-image dataset with conditioning dropout.

use ndarray::Array3;
use rand::Rng;
use std::sync::Arc;
use unclip_core::{
    DatasetConfig, DecodeErrorPolicy, Result, UnclipError, INFINITE_DATASET_LEN,
};

use crate::image_processing::{open_image, ClipImageProcessor, TargetImageProcessor};
use crate::table::{Record, RecordTable};
use crate::tokenizer::Tokenizer;

/// One training sample.
#[derive(Debug, Clone)]
pub struct TextImageSample {
    /// Target image `[3, image_size, image_size]` in `[-1, 1]`.
    pub target_image: Array3<f32>,
    /// Caption token ids, length `seq_len`.
    pub tokens: Vec<u32>,
    /// Attention mask for `tokens`, length `seq_len`.
    pub mask: Vec<u32>,
    /// Conditioning image `[3, clip_image_size, clip_image_size]`, all zero when dropped.
    pub clip_image: Array3<f32>,
    /// Table row the sample was built from.
    pub record_index: usize,
    /// Whether the caption was replaced by the empty string.
    pub text_dropped: bool,
    /// Whether the conditioning image was zeroed.
    pub image_dropped: bool,
}

/// Dataset pairing images with tokenized captions.
///
/// Every access re-decodes the image and re-draws both dropout decisions;
/// nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct TextImageDataset {
    table: Arc<RecordTable>,
    tokenizer: Tokenizer,
    clip_processor: ClipImageProcessor,
    target_processor: TargetImageProcessor,
    config: DatasetConfig,
}

impl TextImageDataset {
    /// Load the table and tokenizer named by `config`.
    pub fn new(config: DatasetConfig) -> Result<Self> {
        config.validate()?;
        let table = RecordTable::load(&config.df_path)?;
        let token = config.hf_token.as_ref().filter(|t| !t.is_empty());
        let tokenizer = Tokenizer::from_pretrained(
            &config.tokenizer_name,
            config.tokenizer_revision.as_deref(),
            token,
        )?;
        Self::from_parts(table, tokenizer, config)
    }

    /// Assemble a dataset from an already loaded table and tokenizer.
    ///
    /// `config.df_path` and `config.tokenizer_name` are not consulted.
    pub fn from_parts(table: RecordTable, tokenizer: Tokenizer, config: DatasetConfig) -> Result<Self> {
        config.validate_ranges()?;

        let tokenizer = tokenizer.with_max_length(config.seq_len)?;
        tracing::debug!(
            "TextImageDataset: {} records, image_size={}, clip_image_size={}, seq_len={}, infinity={}",
            table.len(),
            config.image_size,
            config.clip_image_size,
            config.seq_len,
            config.infinity
        );

        Ok(Self {
            table: Arc::new(table),
            tokenizer,
            clip_processor: ClipImageProcessor::with_size(config.clip_image_size),
            target_processor: TargetImageProcessor::new(config.image_size),
            config,
        })
    }

    /// Number of rows in the underlying table.
    pub fn record_count(&self) -> usize {
        self.table.len()
    }

    /// The configured tokenizer.
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Dataset configuration.
    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Whether the dataset resamples rows instead of indexing them.
    pub fn is_infinite(&self) -> bool {
        self.config.infinity
    }

    fn resolve_row<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<usize> {
        if self.config.infinity {
            return Ok(rng.gen_range(0..self.table.len()));
        }
        if index >= self.table.len() {
            return Err(UnclipError::IndexOutOfRange {
                index,
                len: self.table.len(),
            });
        }
        Ok(index)
    }

    /// Build the sample for one table row.
    fn load_row<R: Rng + ?Sized>(&self, row: usize, rng: &mut R) -> Result<TextImageSample> {
        let record: &Record = self
            .table
            .get(row)
            .ok_or(UnclipError::IndexOutOfRange {
                index: row,
                len: self.table.len(),
            })?;

        let image = open_image(&record.image_name)?;
        let target_image = self.target_processor.process_image(&image)?;

        let text_dropped = rng.gen_bool(self.config.drop_text_prob);
        let caption = if text_dropped { "" } else { record.caption.as_str() };
        let encoded = self.tokenizer.encode_fixed(caption)?;

        let image_dropped = rng.gen_bool(self.config.drop_image_prob);
        let clip_image = if image_dropped {
            self.clip_processor.zeros()
        } else {
            self.clip_processor.process_image(&image)?
        };

        Ok(TextImageSample {
            target_image,
            tokens: encoded.ids,
            mask: encoded.attention_mask,
            clip_image,
            record_index: row,
            text_dropped,
            image_dropped,
        })
    }

    /// Decode failures draw a fresh row until the retry budget runs out.
    fn load_with_resample<R: Rng + ?Sized>(
        &self,
        first_row: usize,
        rng: &mut R,
    ) -> Result<TextImageSample> {
        let mut row = first_row;
        let mut attempt = 1;
        loop {
            match self.load_row(row, rng) {
                Err(e) if e.is_image_decode() && attempt < self.config.max_decode_retries => {
                    tracing::warn!("Resampling after decode failure on row {}: {}", row, e);
                    row = rng.gen_range(0..self.table.len());
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl unclip_core::Dataset for TextImageDataset {
    type Item = TextImageSample;

    fn len(&self) -> usize {
        if self.config.infinity {
            INFINITE_DATASET_LEN
        } else {
            self.table.len()
        }
    }

    fn get<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<TextImageSample> {
        let row = self.resolve_row(index, rng)?;
        match self.config.decode_error_policy {
            DecodeErrorPolicy::Fail => self.load_row(row, rng),
            DecodeErrorPolicy::Resample => self.load_with_resample(row, rng),
        }
    }
}
