use crate::collator::{Collator, SequenceCollator};
use crate::dataset::Dataset;
use crate::minibatch::MiniBatch;
use crate::replica::{ReplicaComm, ReplicaConfig, SingleProcess};
use crate::sampler::{
    ApproxBatchSampler, BatchBudget, BatchSampler, RandomSampler, Sampler, SortishSampler,
};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::config::DataLoaderConfig;

/// Coordinates a [`Dataset`], the length-aware samplers, and a [`Collator`]
/// to produce [`MiniBatch`]es.
///
/// Two modes, chosen by `config.mini_run`:
/// - Length-aware (default): a [`SortishSampler`] orders indices by length
///   and an [`ApproxBatchSampler`] packs them under the configured budget,
///   built eagerly when an epoch's iteration starts.
/// - Mini-run: the whole dataset is shuffled and batched at size 1, for quick
///   end-to-end debugging.
///
/// # Thread safety
/// The loader is `Send + Sync` and can be shared by reference; iterators
/// borrow it and are consumed on one thread.
pub struct DataLoader<D, C = SequenceCollator> {
    dataset: D,
    collator: C,
    config: DataLoaderConfig,
    current_epoch: AtomicUsize,
    plan: BatchPlan,
}

/// How an epoch's batches are drawn. Split out so the mini-run path carries
/// no replica machinery.
enum BatchPlan {
    LengthAware {
        sampler: SortishSampler,
        budget: BatchBudget,
        comm: Arc<dyn ReplicaComm>,
    },
    MiniRun {
        sampler: BatchSampler<RandomSampler>,
    },
}

impl<D: Dataset> DataLoader<D, SequenceCollator> {
    /// Creates a single-process loader with the default ESM-2 collator.
    pub fn new(dataset: D, config: DataLoaderConfig) -> Result<Self> {
        Self::new_with_collator(dataset, config, SequenceCollator::default())
    }
}

impl<D: Dataset, C: Collator> DataLoader<D, C> {
    /// Creates a single-process loader with a custom collator.
    pub fn new_with_collator(dataset: D, config: DataLoaderConfig, collator: C) -> Result<Self> {
        Self::new_distributed(
            dataset,
            config,
            collator,
            ReplicaConfig::single(),
            Arc::new(SingleProcess),
        )
    }

    /// Creates a loader for one replica of a data-parallel group.
    ///
    /// `comm` must span the same group as `replica`; with more than one
    /// replica every member must iterate each epoch, since batch counts are
    /// equalized with a blocking max-reduction.
    pub fn new_distributed(
        dataset: D,
        config: DataLoaderConfig,
        collator: C,
        replica: ReplicaConfig,
        comm: Arc<dyn ReplicaComm>,
    ) -> Result<Self> {
        config.validate()?;

        let plan = if config.mini_run {
            let sampler = RandomSampler::new(dataset.len(), config.seed.unwrap_or(0))?;
            BatchPlan::MiniRun {
                sampler: BatchSampler::new(sampler, 1, false)?,
            }
        } else {
            let sampler =
                SortishSampler::new(dataset.metadata_lens(), config.bucket_size, replica)?;
            let mut budget = BatchBudget::new(config.max_tokens, config.max_batch_size)
                .with_max_len(config.max_len);
            if let Some(max_square_tokens) = config.max_square_tokens {
                budget = budget.with_max_square_tokens(max_square_tokens);
            }
            BatchPlan::LengthAware {
                sampler,
                budget,
                comm,
            }
        };

        Ok(Self {
            dataset,
            collator,
            config,
            current_epoch: AtomicUsize::new(0),
            plan,
        })
    }

    /// Sets the epoch that seeds the next iteration's shuffle. Call before
    /// each training epoch; otherwise every epoch replays the epoch-0 order.
    pub fn set_epoch(&self, epoch: usize) {
        self.current_epoch.store(epoch, Ordering::Relaxed);
        if let BatchPlan::LengthAware { sampler, .. } = &self.plan {
            sampler.set_epoch(epoch);
        }
    }

    pub fn epoch(&self) -> usize {
        self.current_epoch.load(Ordering::Relaxed)
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }

    /// Starts one epoch of iteration at the current epoch.
    ///
    /// In length-aware mode the batch plan is packed up front, so with more
    /// than one replica this call blocks until the whole group reaches it.
    /// Each yielded item is one collated batch; a fetch or collation failure
    /// surfaces as an `Err` item rather than aborting the iterator.
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<MiniBatch>> + '_> {
        let epoch = self.epoch();
        let batches: Box<dyn Iterator<Item = Vec<usize>> + Send + '_> = match &self.plan {
            BatchPlan::LengthAware {
                sampler,
                budget,
                comm,
            } => {
                let packer = ApproxBatchSampler::new(
                    sampler,
                    budget,
                    self.dataset.metadata_lens(),
                    comm.as_ref(),
                )?;
                Box::new(packer.into_batches().into_iter())
            }
            BatchPlan::MiniRun { sampler } => sampler.iter(epoch),
        };

        Ok(batches.map(move |batch| self.collate_batch(&batch)))
    }

    fn collate_batch(&self, batch: &[usize]) -> Result<MiniBatch> {
        let sequences: Vec<String> = batch
            .iter()
            .map(|&index| {
                self.dataset
                    .get(index)
                    .with_context(|| format!("failed to fetch example {index}"))
            })
            .collect::<Result<_>>()?;
        self.collator.collate(&sequences)
    }
}
