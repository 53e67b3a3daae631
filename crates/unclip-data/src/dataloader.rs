//! DataLoader for creating training batches.
//!
//! Each sample gets its own generator seeded from `(seed, epoch, position)`,
//! so a batch is the same whether it was fetched on the calling thread or
//! spread across a worker pool.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::sync::Arc;
use unclip_core::{Dataset, LoaderConfig, Result, UnclipError};

use crate::collator::{DataCollator, TextImageBatch};
use crate::dataset::TextImageDataset;

/// Configuration for the DataLoader.
#[derive(Debug, Clone)]
pub struct DataLoaderConfig {
    /// Batch size.
    pub batch_size: usize,
    /// Worker threads (0 = fetch on the calling thread).
    pub num_workers: usize,
    /// Whether to shuffle the data.
    pub shuffle: bool,
    /// Seed for shuffling and for the per-sample dropout draws.
    pub seed: u64,
    /// Whether to drop the last incomplete batch.
    pub drop_last: bool,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            num_workers: 0,
            shuffle: false,
            seed: 42,
            drop_last: false,
        }
    }
}

/// An unset `LoaderConfig::seed` is drawn from entropy here, so two loaders
/// built from the same config shuffle and drop out independently.
impl From<&LoaderConfig> for DataLoaderConfig {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            num_workers: config.num_workers,
            shuffle: config.shuffle,
            seed: config.seed.unwrap_or_else(rand::random),
            drop_last: config.drop_last,
        }
    }
}

/// DataLoader that yields batches from a [`TextImageDataset`].
#[derive(Debug)]
pub struct DataLoader {
    dataset: Arc<TextImageDataset>,
    config: DataLoaderConfig,
    collator: DataCollator,
    /// Epoch permutation. `None` means identity order; infinite datasets
    /// never materialize one since they ignore the index.
    indices: Option<Vec<usize>>,
    position: usize,
    epoch: u64,
    pool: Option<rayon::ThreadPool>,
}

impl DataLoader {
    /// Create a new DataLoader.
    pub fn new(dataset: Arc<TextImageDataset>, config: DataLoaderConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(UnclipError::Config("batch_size must be positive".into()));
        }

        let pool = if config.num_workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.num_workers)
                .thread_name(|i| format!("unclip-loader-{i}"))
                .build()
                .map_err(|e| UnclipError::Config(format!("failed to build worker pool: {e}")))?;
            Some(pool)
        } else {
            None
        };

        let collator = DataCollator::from_config(dataset.config());
        let mut loader = Self {
            dataset,
            config,
            collator,
            indices: None,
            position: 0,
            epoch: 0,
            pool,
        };
        loader.reshuffle();

        tracing::debug!(
            "DataLoader: {} samples, batch_size={}, num_workers={}, shuffle={}, seed={}",
            loader.len(),
            loader.config.batch_size,
            loader.config.num_workers,
            loader.config.shuffle,
            loader.config.seed
        );
        Ok(loader)
    }

    /// Reset the DataLoader to the start of the current epoch.
    ///
    /// With `Some(seed)` the loader switches to the new seed, which changes
    /// both the shuffle order and the dropout draws.
    pub fn reset(&mut self, new_seed: Option<u64>) {
        if let Some(seed) = new_seed {
            self.config.seed = seed;
        }
        self.position = 0;
        self.reshuffle();
    }

    /// Start epoch `epoch`: rewinds, reshuffles and re-draws dropout.
    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
        self.position = 0;
        self.reshuffle();
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The loader configuration.
    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }

    /// Get the number of batches.
    pub fn num_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.config.drop_last {
            n / self.config.batch_size
        } else {
            n.div_ceil(self.config.batch_size)
        }
    }

    /// Get the total number of samples.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Check if the loader is empty.
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    fn reshuffle(&mut self) {
        self.indices = if self.config.shuffle && !self.dataset.is_infinite() {
            let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
            let mut rng = StdRng::seed_from_u64(epoch_seed(self.config.seed, self.epoch));
            indices.shuffle(&mut rng);
            Some(indices)
        } else {
            None
        };
    }

    /// Fetch and collate the samples at positions `start..end`.
    fn fetch(&self, start: usize, end: usize) -> Result<TextImageBatch> {
        let dataset = &self.dataset;
        let indices = self.indices.as_deref();
        let base = epoch_seed(self.config.seed, self.epoch);

        let load = |position: usize| {
            let index = indices.map_or(position, |order| order[position]);
            let mut rng = StdRng::seed_from_u64(sample_seed(base, position));
            dataset.get(index, &mut rng)
        };

        let samples: Result<Vec<_>> = match &self.pool {
            Some(pool) => pool.install(|| (start..end).into_par_iter().map(load).collect()),
            None => (start..end).map(load).collect(),
        };
        self.collator.collate(&samples?)
    }
}

impl Iterator for DataLoader {
    type Item = Result<TextImageBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.len();
        if self.position >= len {
            return None;
        }

        let start = self.position;
        let end = (start + self.config.batch_size).min(len);
        if self.config.drop_last && end - start < self.config.batch_size {
            self.position = len;
            return None;
        }
        self.position = end;

        tracing::debug!("Fetching samples {}..{} (epoch {})", start, end, self.epoch);
        let batch = self.fetch(start, end);
        if let Err(e) = &batch {
            tracing::error!("Batch {}..{} failed: {}", start, end, e);
        }
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining_samples = self.len().saturating_sub(self.position);
        let remaining = if self.config.drop_last {
            remaining_samples / self.config.batch_size
        } else {
            remaining_samples.div_ceil(self.config.batch_size)
        };
        (remaining, Some(remaining))
    }
}

/// Build the dataset named by `config` and wrap it in a loader.
pub fn create_loader(config: &LoaderConfig) -> Result<DataLoader> {
    config.validate()?;
    let dataset = TextImageDataset::new(config.dataset.clone())?;
    DataLoader::new(Arc::new(dataset), DataLoaderConfig::from(config))
}

// SplitMix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn epoch_seed(seed: u64, epoch: u64) -> u64 {
    mix(mix(seed) ^ epoch)
}

fn sample_seed(epoch_seed: u64, position: usize) -> u64 {
    mix(epoch_seed ^ mix(position as u64))
}
