//! Configuration for DataLoader behaviour.
//!
//! Example:
//! ```ignore
//! let config = DataLoaderConfig::builder()
//!     .max_tokens(6000)
//!     .bucket_size(1000)
//!     .max_batch_size(800)
//!     .build();
//! ```

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Configuration for [`DataLoader`](super::DataLoader).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLoaderConfig {
    /// Linear token budget per batch, `|batch| * max(effective length)`.
    pub max_tokens: usize,
    /// How many neighbouring lengths share a shuffle bucket in the
    /// length-aware ordering.
    pub bucket_size: usize,
    /// Maximum number of examples per batch.
    pub max_batch_size: usize,
    /// Optional quadratic (attention-cost) budget per batch.
    pub max_square_tokens: Option<u64>,
    /// Cap on each example's effective length for cost computation. Does not
    /// truncate the underlying data.
    pub max_len: usize,
    /// Debugging mode: shuffle the whole dataset and batch at size 1 instead
    /// of length-aware packing.
    pub mini_run: bool,
    /// Base seed for the mini-run shuffle. Length-aware iteration is seeded
    /// by the epoch alone.
    pub seed: Option<u64>,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            max_tokens: 6000,
            bucket_size: 1000,
            max_batch_size: 800,
            max_square_tokens: None,
            max_len: 512,
            mini_run: false,
            seed: None,
        }
    }
}

impl DataLoaderConfig {
    pub fn builder() -> DataLoaderConfigBuilder {
        DataLoaderConfigBuilder::default()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        ensure!(self.max_tokens > 0, "max_tokens must be > 0");
        ensure!(self.bucket_size > 0, "bucket_size must be > 0");
        ensure!(self.max_batch_size > 0, "max_batch_size must be > 0");
        ensure!(self.max_len > 0, "max_len must be > 0");
        ensure!(
            self.max_square_tokens != Some(0),
            "max_square_tokens must be > 0 when set"
        );
        Ok(())
    }
}

/// Builder for [`DataLoaderConfig`] with method chaining.
#[derive(Default)]
pub struct DataLoaderConfigBuilder {
    config: DataLoaderConfig,
}

impl DataLoaderConfigBuilder {
    /// Set the linear token budget per batch.
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    /// Set the length-sorting bucket size. Larger buckets trade length
    /// locality for more shuffle randomness.
    pub fn bucket_size(mut self, bucket_size: usize) -> Self {
        self.config.bucket_size = bucket_size;
        self
    }

    /// Set the maximum batch cardinality.
    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.config.max_batch_size = max_batch_size;
        self
    }

    /// Set the quadratic budget per batch.
    pub fn max_square_tokens(mut self, max_square_tokens: u64) -> Self {
        self.config.max_square_tokens = Some(max_square_tokens);
        self
    }

    /// Set the effective-length cap used for cost computation.
    pub fn max_len(mut self, max_len: usize) -> Self {
        self.config.max_len = max_len;
        self
    }

    /// Enable whole-dataset shuffling with batch size 1.
    pub fn mini_run(mut self, mini_run: bool) -> Self {
        self.config.mini_run = mini_run;
        self
    }

    /// Set the base seed for the mini-run shuffle.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> DataLoaderConfig {
        self.config
    }
}
