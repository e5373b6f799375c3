//! Dataset loading and length-aware adaptive batching for training protein
//! sequence models.
//!
//! The pipeline composes four pieces:
//!
//! 1. A [`Dataset`](dataset::Dataset) of raw amino-acid sequences (typically a
//!    [`CsvDataset`](dataset::CsvDataset)) that also exposes a per-example
//!    length table.
//! 2. A [`SortishSampler`](sampler::SortishSampler) that orders indices so
//!    similar lengths land close together while re-shuffling every epoch.
//! 3. An [`ApproxBatchSampler`](sampler::ApproxBatchSampler) that greedily
//!    packs the ordered indices into batches bounded by a token budget, a
//!    batch-size cap, and an optional quadratic (attention-cost) budget, then
//!    synchronizes the batch count across data-parallel replicas.
//! 4. A [`SequenceCollator`](collator::SequenceCollator) that tokenizes each
//!    batch with the ESM-2 residue vocabulary and pads it into a
//!    [`MiniBatch`](minibatch::MiniBatch) of `input_ids` / `input_mask` /
//!    `targets` tensors.
//!
//! [`DataLoader`](dataloader::DataLoader) wires the pieces together, and
//! [`ProteinDataModule`](datamodule::ProteinDataModule) handles the
//! fit/test/predict lifecycle around it.

pub mod alphabet;
pub mod collator;
pub mod dataloader;
pub mod datamodule;
pub mod dataset;
pub mod lr_schedule;
pub mod minibatch;
pub mod replica;
pub mod sampler;

pub use alphabet::Alphabet;
pub use collator::{Collator, SequenceCollator};
pub use dataloader::{DataLoader, DataLoaderConfig};
pub use datamodule::{DataModuleConfig, ProteinDataModule, Stage};
pub use dataset::{CsvDataset, CsvDatasetOptions, Dataset, Subset};
pub use lr_schedule::LrSchedule;
pub use minibatch::MiniBatch;
pub use replica::{LocalGroup, ReplicaComm, ReplicaConfig, SingleProcess};
pub use sampler::{
    ApproxBatchSampler, BatchBudget, BatchSampler, RandomSampler, Sampler, SortishSampler,
};
