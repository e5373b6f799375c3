//! The `DataLoader` coordinates the `Dataset`, samplers, and `Collator` to
//! batch protein sequences for training.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌─────────┐
//!                    │ Dataset │ (CsvDataset, Subset, ...)
//!                    └────┬────┘
//!                         │ sequences + length table
//!                         ↓
//!                 ┌────────────────┐
//!                 │ SortishSampler │ (length-sorted, per-epoch shuffle)
//!                 └───────┬────────┘
//!                         │ ordered indices, one shard per replica
//!                         ↓
//!               ┌────────────────────┐
//!               │ ApproxBatchSampler │ ←──── BatchBudget (tokens, size, sq)
//!               └─────────┬──────────┘
//!                         │ packed index batches, count-synchronized
//!                         ↓
//!                  ┌──────────────┐
//!                  │  DataLoader  │ ←──── DataLoaderConfig
//!                  └──────┬───────┘
//!                         │ fetches sequences per batch
//!                         ↓
//!                ┌──────────────────┐
//!                │ SequenceCollator │ (tokenize + pad)
//!                └────────┬─────────┘
//!                         ↓
//!                   ┌───────────┐
//!                   │ MiniBatch │ (input_ids / input_mask / targets)
//!                   └───────────┘
//! ```
//!
//! With `mini_run` enabled the sampler column is replaced by a whole-dataset
//! shuffle batched at size 1.
//!
//! # Example
//! ```ignore
//! let dataset = CsvDataset::open("train.csv", CsvDatasetOptions::default())?;
//! let config = DataLoaderConfig::builder()
//!     .max_tokens(6000)
//!     .bucket_size(1000)
//!     .max_batch_size(800)
//!     .build();
//! let loader = DataLoader::new(dataset, config)?;
//!
//! for epoch in 0..num_epochs {
//!     loader.set_epoch(epoch);
//!     for batch in loader.iter()? {
//!         let batch: MiniBatch = batch?;
//!         // batch.get("input_ids")?, ...
//!     }
//! }
//! ```

mod config;
mod loader;

pub use config::{DataLoaderConfig, DataLoaderConfigBuilder};
pub use loader::DataLoader;
