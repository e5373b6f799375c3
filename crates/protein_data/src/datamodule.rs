//! Fit/test/predict lifecycle around [`DataLoader`].
//!
//! The datamodule owns the CSV-backed datasets for each stage and hands out
//! configured loaders: length-aware token-budget batching for training and
//! validation, fixed small batches for test and predict.

use crate::dataloader::{DataLoader, DataLoaderConfig};
use crate::dataset::{CsvDataset, CsvDatasetOptions, Dataset, Subset};
use anyhow::{anyhow, bail, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Which part of the training lifecycle the datamodule is prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Fit,
    Test,
    Predict,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fit => "fit",
            Stage::Test => "test",
            Stage::Predict => "predict",
        }
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fit" => Ok(Stage::Fit),
            "test" => Ok(Stage::Test),
            "predict" => Ok(Stage::Predict),
            other => bail!("invalid stage '{other}', expected 'fit', 'test', or 'predict'"),
        }
    }
}

/// Configuration for [`ProteinDataModule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataModuleConfig {
    /// Path to the sequence CSV.
    pub data_path: PathBuf,
    /// Linear token budget per batch.
    pub max_tokens: usize,
    /// Maximum sequence length; longer sequences are randomly cropped on
    /// access, and the same value caps the batching cost.
    pub max_len: usize,
    /// Bucket size and batch cap for the test/predict loaders.
    pub num_seqs: usize,
    /// Subsample to 100 examples per split and batch at size 1, for quick
    /// end-to-end debugging.
    pub mini_run: bool,
    /// Seed for the mini-run subsampling and shuffles.
    pub seed: Option<u64>,
}

impl DataModuleConfig {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            max_tokens: 6000,
            max_len: 2048,
            num_seqs: 40,
            mini_run: false,
            seed: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn with_num_seqs(mut self, num_seqs: usize) -> Self {
        self.num_seqs = num_seqs;
        self
    }

    pub fn with_mini_run(mut self, mini_run: bool) -> Self {
        self.mini_run = mini_run;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Loads the per-stage datasets and builds their loaders.
///
/// Call [`setup`](ProteinDataModule::setup) with the intended [`Stage`]
/// first; the `*_dataloader` methods error if their dataset has not been
/// loaded. `Fit` loads the train and valid datasets over the full CSV,
/// `Test`/`Predict` load the rows whose split column is `"valid"`.
pub struct ProteinDataModule {
    config: DataModuleConfig,
    stage: Option<Stage>,
    train_dataset: Option<Arc<dyn Dataset>>,
    valid_dataset: Option<Arc<dyn Dataset>>,
    test_dataset: Option<Arc<dyn Dataset>>,
}

impl ProteinDataModule {
    pub fn new(config: DataModuleConfig) -> Self {
        Self {
            config,
            stage: None,
            train_dataset: None,
            valid_dataset: None,
            test_dataset: None,
        }
    }

    fn open_dataset(&self, split: Option<&str>) -> Result<CsvDataset> {
        let options = CsvDatasetOptions {
            split: split.map(str::to_string),
            max_len: self.config.max_len,
            ..CsvDatasetOptions::default()
        };
        CsvDataset::open(&self.config.data_path, options)
    }

    /// Loads the datasets the given stage needs.
    pub fn setup(&mut self, stage: Stage) -> Result<()> {
        match stage {
            Stage::Fit => {
                let train = self.open_dataset(None)?;
                let valid = self.open_dataset(None)?;
                if self.config.mini_run {
                    let mut rng = StdRng::seed_from_u64(self.config.seed.unwrap_or(0));
                    let mini_size = 100;

                    // Train: distinct draws from the head of the dataset,
                    // kept in sorted order.
                    let pool = train.len().min(1000);
                    let mut train_indices: Vec<usize> =
                        rand::seq::index::sample(&mut rng, pool, mini_size.min(pool)).into_vec();
                    train_indices.sort_unstable();
                    self.train_dataset = Some(Arc::new(Subset::new(train, train_indices)?));

                    // Valid: draws with replacement over the whole dataset.
                    let valid_indices: Vec<usize> = (0..mini_size)
                        .map(|_| rng.random_range(0..valid.len()))
                        .collect();
                    self.valid_dataset = Some(Arc::new(Subset::new(valid, valid_indices)?));
                } else {
                    self.train_dataset = Some(Arc::new(train));
                    self.valid_dataset = Some(Arc::new(valid));
                }
            }
            Stage::Test | Stage::Predict => {
                self.test_dataset = Some(Arc::new(self.open_dataset(Some("valid"))?));
            }
        }
        self.stage = Some(stage);
        tracing::info!(stage = stage.as_str(), "datamodule set up");
        Ok(())
    }

    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    fn loader_config(&self, bucket_size: usize, max_batch_size: usize) -> DataLoaderConfig {
        let mut builder = DataLoaderConfig::builder()
            .max_tokens(self.config.max_tokens)
            .bucket_size(bucket_size)
            .max_batch_size(max_batch_size)
            .max_len(self.config.max_len)
            .mini_run(self.config.mini_run);
        if let Some(seed) = self.config.seed {
            builder = builder.seed(seed);
        }
        builder.build()
    }

    pub fn train_dataloader(&self) -> Result<DataLoader<Arc<dyn Dataset>>> {
        let dataset = self
            .train_dataset
            .clone()
            .ok_or_else(|| anyhow!("train dataset not loaded, call setup(Stage::Fit) first"))?;
        // Evaluation over the training set runs one example at a time.
        let max_batch_size = match self.stage {
            Some(Stage::Test) | Some(Stage::Predict) => 1,
            _ => 800,
        };
        DataLoader::new(dataset, self.loader_config(1000, max_batch_size))
    }

    pub fn val_dataloader(&self) -> Result<DataLoader<Arc<dyn Dataset>>> {
        let dataset = self
            .valid_dataset
            .clone()
            .ok_or_else(|| anyhow!("valid dataset not loaded, call setup(Stage::Fit) first"))?;
        DataLoader::new(dataset, self.loader_config(1000, 800))
    }

    pub fn test_dataloader(&self) -> Result<DataLoader<Arc<dyn Dataset>>> {
        let dataset = self.test_dataset.clone().ok_or_else(|| {
            anyhow!("test dataset not loaded, call setup(Stage::Test) or setup(Stage::Predict) first")
        })?;
        DataLoader::new(
            dataset,
            self.loader_config(self.config.num_seqs, self.config.num_seqs),
        )
    }
}
