//! Core trait definitions.

use crate::Result;
use rand::Rng;

/// Indexable dataset whose items may be stochastic.
///
/// Randomness is supplied by the caller on every access so that sample
/// generation is reproducible from a seed and independent of which worker
/// thread performs it.
pub trait Dataset: Send + Sync {
    /// The item type yielded by this dataset.
    type Item;

    /// Number of addressable samples.
    fn len(&self) -> usize;

    /// Check if the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produce the sample at `index`, drawing any randomness from `rng`.
    fn get<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Self::Item>;
}

/// Capability interface consumed by a training orchestrator.
///
/// Each accessor builds a fresh loader from configuration held by the
/// implementor; calling one never affects the others.
pub trait DataModule {
    /// The batch iterator handed to the training loop.
    type Loader;

    /// Loader over the training split.
    fn train_dataloader(&self) -> Result<Self::Loader>;

    /// Loader over the validation split.
    fn val_dataloader(&self) -> Result<Self::Loader>;

    /// Loader over the test split.
    fn test_dataloader(&self) -> Result<Self::Loader>;
}
