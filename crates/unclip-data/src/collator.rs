//! Data collation utilities.

use ndarray::{stack, Array2, Array3, Array4, ArrayView3, Axis};
use unclip_core::{DatasetConfig, Result, UnclipError};

use crate::dataset::TextImageSample;

/// A batch of samples stacked along a new leading dimension.
#[derive(Debug, Clone)]
pub struct TextImageBatch {
    /// Target images `[batch_size, 3, image_size, image_size]` in `[-1, 1]`.
    pub target_images: Array4<f32>,
    /// Caption token ids `[batch_size, seq_len]`.
    pub tokens: Array2<u32>,
    /// Attention mask `[batch_size, seq_len]`.
    pub mask: Array2<u32>,
    /// Conditioning images `[batch_size, 3, clip_image_size, clip_image_size]`.
    pub clip_images: Array4<f32>,
    /// Table row of each sample.
    pub record_indices: Vec<usize>,
    /// Per-sample caption dropout outcome.
    pub text_dropped: Vec<bool>,
    /// Per-sample conditioning image dropout outcome.
    pub image_dropped: Vec<bool>,
    /// Number of samples in this batch.
    pub batch_size: usize,
    /// Sequence length.
    pub seq_len: usize,
}

/// Stacks samples whose shapes are fixed by the dataset configuration.
#[derive(Debug, Clone, Copy)]
pub struct DataCollator {
    /// Token sequence length.
    pub seq_len: usize,
    /// Conditioning image edge.
    pub clip_image_size: usize,
    /// Target image edge.
    pub image_size: usize,
}

impl DataCollator {
    /// Create a new data collator.
    pub fn new(seq_len: usize, clip_image_size: usize, image_size: usize) -> Self {
        Self {
            seq_len,
            clip_image_size,
            image_size,
        }
    }

    /// Collator matching the shapes a dataset configuration produces.
    pub fn from_config(config: &DatasetConfig) -> Self {
        Self::new(
            config.seq_len,
            config.clip_image_size as usize,
            config.image_size as usize,
        )
    }

    /// Collate samples into a batch.
    pub fn collate(&self, samples: &[TextImageSample]) -> Result<TextImageBatch> {
        if samples.is_empty() {
            return Err(UnclipError::InvalidArgument("cannot collate an empty batch".into()));
        }
        let batch_size = samples.len();

        let target_shape = [3, self.image_size, self.image_size];
        let clip_shape = [3, self.clip_image_size, self.clip_image_size];
        for sample in samples {
            check_shape(&target_shape, sample.target_image.shape())?;
            check_shape(&clip_shape, sample.clip_image.shape())?;
            check_shape(&[self.seq_len], &[sample.tokens.len()])?;
            check_shape(&[self.seq_len], &[sample.mask.len()])?;
        }

        let target_images = stack_images(samples.iter().map(|s| &s.target_image))?;
        let clip_images = stack_images(samples.iter().map(|s| &s.clip_image))?;

        let mut tokens_flat = Vec::with_capacity(batch_size * self.seq_len);
        let mut mask_flat = Vec::with_capacity(batch_size * self.seq_len);
        for sample in samples {
            tokens_flat.extend_from_slice(&sample.tokens);
            mask_flat.extend_from_slice(&sample.mask);
        }
        let tokens = token_matrix(tokens_flat, batch_size, self.seq_len)?;
        let mask = token_matrix(mask_flat, batch_size, self.seq_len)?;

        Ok(TextImageBatch {
            target_images,
            tokens,
            mask,
            clip_images,
            record_indices: samples.iter().map(|s| s.record_index).collect(),
            text_dropped: samples.iter().map(|s| s.text_dropped).collect(),
            image_dropped: samples.iter().map(|s| s.image_dropped).collect(),
            batch_size,
            seq_len: self.seq_len,
        })
    }
}

fn check_shape(expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected != actual {
        return Err(UnclipError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

fn stack_images<'a>(images: impl Iterator<Item = &'a Array3<f32>>) -> Result<Array4<f32>> {
    let views: Vec<ArrayView3<'_, f32>> = images.map(|a| a.view()).collect();
    stack(Axis(0), &views).map_err(|e| UnclipError::InvalidArgument(e.to_string()))
}

fn token_matrix(flat: Vec<u32>, rows: usize, cols: usize) -> Result<Array2<u32>> {
    let len = flat.len();
    Array2::from_shape_vec((rows, cols), flat).map_err(|_| UnclipError::ShapeMismatch {
        expected: vec![rows, cols],
        actual: vec![len],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(fill: f32, record_index: usize) -> TextImageSample {
        TextImageSample {
            target_image: Array3::from_elem((3, 4, 4), fill),
            tokens: vec![0, 4, 2, 1, 1],
            mask: vec![1, 1, 1, 0, 0],
            clip_image: Array3::zeros((3, 2, 2)),
            record_index,
            text_dropped: false,
            image_dropped: record_index % 2 == 1,
        }
    }

    #[test]
    fn test_collate_stacks_along_batch_dim() {
        let collator = DataCollator::new(5, 2, 4);
        let batch = collator
            .collate(&[sample(0.25, 0), sample(-0.5, 1), sample(1.0, 2)])
            .unwrap();

        assert_eq!(batch.batch_size, 3);
        assert_eq!(batch.seq_len, 5);
        assert_eq!(batch.target_images.shape(), &[3, 3, 4, 4]);
        assert_eq!(batch.clip_images.shape(), &[3, 3, 2, 2]);
        assert_eq!(batch.tokens.shape(), &[3, 5]);
        assert_eq!(batch.mask.shape(), &[3, 5]);
        assert_eq!(batch.target_images[[1, 2, 3, 3]], -0.5);
        assert_eq!(batch.tokens.row(2).to_vec(), vec![0, 4, 2, 1, 1]);
        assert_eq!(batch.record_indices, vec![0, 1, 2]);
        assert_eq!(batch.image_dropped, vec![false, true, false]);
    }

    #[test]
    fn test_collate_rejects_shape_mismatch() {
        let collator = DataCollator::new(5, 2, 4);
        let mut bad = sample(0.0, 1);
        bad.tokens.push(1);

        let result = collator.collate(&[sample(0.0, 0), bad]);
        assert!(matches!(result, Err(UnclipError::ShapeMismatch { .. })));

        let mut bad = sample(0.0, 1);
        bad.clip_image = Array3::zeros((3, 3, 3));
        assert!(collator.collate(&[bad]).is_err());
    }

    #[test]
    fn test_collate_empty() {
        let collator = DataCollator::new(5, 2, 4);
        assert!(matches!(
            collator.collate(&[]),
            Err(UnclipError::InvalidArgument(_))
        ));
    }
}
