use crate::replica::{ReplicaComm, ReplicaConfig};
use anyhow::{ensure, Result};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A `Sampler` defines the strategy for how to iterate and draw example
/// indices from a dataset.
///
/// `iter(epoch)` returns a finite, restartable sequence for that epoch: the
/// sampler seeds a private RNG from the epoch on every call, so repeated
/// iteration at the same epoch yields identical results and there is no hidden
/// global randomness.
///
/// Implementations must be `Send + Sync` so a sampler can be shared by
/// reference across threads.
pub trait Sampler: Send + Sync {
    type Item: Send + Sync;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_>;
}

// ================================================================================================
/// Yields a fresh whole-dataset permutation every epoch.
///
/// Used by the mini-run path, which shuffles the entire dataset and batches at
/// size 1. The RNG is seeded with `base_seed + epoch` so the same seed
/// reproduces the same order at a given epoch.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    dataset_size: usize,
    base_seed: u64,
}

impl RandomSampler {
    pub fn new(dataset_size: usize, base_seed: u64) -> Result<Self> {
        ensure!(dataset_size > 0, "dataset must not be empty");
        Ok(Self {
            dataset_size,
            base_seed,
        })
    }
}

impl Sampler for RandomSampler {
    type Item = usize;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        let mut rng = StdRng::seed_from_u64(self.base_seed.wrapping_add(epoch as u64));
        let mut indices: Vec<usize> = (0..self.dataset_size).collect();
        indices.shuffle(&mut rng);
        Box::new(indices.into_iter())
    }
}

// ================================================================================================
/// Wraps a [`Sampler`] to yield fixed-size mini-batches of its items.
///
/// If `drop_last` is `true`, a final mini-batch smaller than `batch_size` is
/// discarded.
#[derive(Debug, Clone)]
pub struct BatchSampler<S> {
    sampler: S,
    batch_size: usize,
    drop_last: bool,
}

impl<S: Sampler> BatchSampler<S> {
    pub fn new(sampler: S, batch_size: usize, drop_last: bool) -> Result<Self> {
        ensure!(
            batch_size > 0,
            "batch_size must be > 0, but got batch_size={}",
            batch_size
        );
        Ok(Self {
            sampler,
            batch_size,
            drop_last,
        })
    }
}

impl<S: Sampler> Sampler for BatchSampler<S> {
    type Item = Vec<S::Item>;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_> {
        let mut inner = self.sampler.iter(epoch);
        let batch_size = self.batch_size;
        let drop_last = self.drop_last;

        Box::new(std::iter::from_fn(move || {
            let mut batch = Vec::with_capacity(batch_size);
            for _ in 0..batch_size {
                match inner.next() {
                    Some(item) => batch.push(item),
                    None => break,
                }
            }
            if batch.len() == batch_size || (!drop_last && !batch.is_empty()) {
                Some(batch)
            } else {
                None
            }
        }))
    }
}

// ================================================================================================
/// Orders dataset indices so that examples with similar lengths are close
/// together, while keeping epoch-to-epoch randomness.
///
/// Construction sorts the index permutation ascending by sequence length and
/// partitions it into contiguous buckets of `bucket_size` (the last bucket may
/// be shorter). Each epoch's iteration then shuffles within every bucket,
/// shuffles the bucket order, flattens, pads the sequence by cycling from the
/// front to `num_samples * num_replicas`, and takes this replica's contiguous
/// slice of `num_samples` indices.
///
/// The trainer calls [`set_epoch`](SortishSampler::set_epoch) before each
/// epoch; the stored epoch seeds the shuffle, so iteration is deterministic
/// per epoch and differs between epochs.
pub struct SortishSampler {
    buckets: Vec<Vec<usize>>,
    dataset_size: usize,
    num_samples: usize,
    total_size: usize,
    replica: ReplicaConfig,
    epoch: AtomicUsize,
}

impl SortishSampler {
    /// # Arguments
    /// - `sequence_lengths`: one length per example, index-aligned with the
    ///   dataset.
    /// - `bucket_size`: how many neighbouring lengths share a shuffle bucket.
    ///   Larger buckets trade length locality for more randomness.
    /// - `replica`: this process's view of the data-parallel group.
    pub fn new(
        sequence_lengths: &[usize],
        bucket_size: usize,
        replica: ReplicaConfig,
    ) -> Result<Self> {
        ensure!(
            !sequence_lengths.is_empty(),
            "sequence length table must not be empty"
        );
        ensure!(bucket_size > 0, "bucket_size must be > 0");

        let mut order: Vec<usize> = (0..sequence_lengths.len()).collect();
        order.sort_by_key(|&index| sequence_lengths[index]);
        let buckets = order.chunks(bucket_size).map(<[usize]>::to_vec).collect();

        let num_samples = sequence_lengths.len().div_ceil(replica.num_replicas);
        Ok(Self {
            buckets,
            dataset_size: sequence_lengths.len(),
            num_samples,
            total_size: num_samples * replica.num_replicas,
            replica,
            epoch: AtomicUsize::new(0),
        })
    }

    /// Stores the epoch used to seed the next iteration. Without calling this,
    /// every epoch replays the epoch-0 order.
    pub fn set_epoch(&self, epoch: usize) {
        self.epoch.store(epoch, Ordering::Relaxed);
    }

    pub fn epoch(&self) -> usize {
        self.epoch.load(Ordering::Relaxed)
    }

    pub fn replica(&self) -> ReplicaConfig {
        self.replica
    }

    /// Number of examples in the underlying dataset (before padding).
    pub fn dataset_size(&self) -> usize {
        self.dataset_size
    }

    /// Number of indices this replica yields per epoch,
    /// `ceil(dataset_size / num_replicas)`.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.num_samples
    }
}

impl Sampler for SortishSampler {
    type Item = usize;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        let mut rng = StdRng::seed_from_u64(epoch as u64);

        let mut buckets = self.buckets.clone();
        for bucket in &mut buckets {
            bucket.shuffle(&mut rng);
        }
        buckets.shuffle(&mut rng);

        let flattened: Vec<usize> = buckets.into_iter().flatten().collect();

        // Pad by cycling from the front so `total_size` splits evenly across
        // replicas, then take this rank's contiguous slice.
        let shard: Vec<usize> = flattened
            .iter()
            .copied()
            .cycle()
            .take(self.total_size)
            .skip(self.replica.rank * self.num_samples)
            .take(self.num_samples)
            .collect();
        assert_eq!(
            shard.len(),
            self.num_samples,
            "replica shard has {} indices, expected {}; the padded permutation is inconsistent",
            shard.len(),
            self.num_samples,
        );
        Box::new(shard.into_iter())
    }
}

// ================================================================================================
/// Cost budget for [`ApproxBatchSampler`].
///
/// A batch's linear cost is `|batch| * max(effective length)` and its
/// quadratic cost is `|batch| * max(effective length)^2`, where the effective
/// length is each example's length capped at `max_len`. The linear cost
/// approximates the token count, the quadratic cost the attention compute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchBudget {
    /// Maximum linear cost per batch.
    pub max_tokens: usize,
    /// Maximum batch cardinality.
    pub max_batch: usize,
    /// Maximum quadratic cost per batch; `None` leaves it unbounded.
    pub max_square_tokens: Option<u64>,
    /// Cap applied to each example's length before cost computation. Does not
    /// truncate the underlying data.
    pub max_len: usize,
}

impl BatchBudget {
    pub fn new(max_tokens: usize, max_batch: usize) -> Self {
        Self {
            max_tokens,
            max_batch,
            max_square_tokens: None,
            max_len: 512,
        }
    }

    pub fn with_max_square_tokens(mut self, max_square_tokens: u64) -> Self {
        self.max_square_tokens = Some(max_square_tokens);
        self
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.max_tokens > 0, "max_tokens must be > 0");
        ensure!(self.max_batch > 0, "max_batch must be > 0");
        ensure!(self.max_len > 0, "max_len must be > 0");
        ensure!(
            self.max_square_tokens != Some(0),
            "max_square_tokens must be > 0 when set"
        );
        Ok(())
    }

    /// Whether a batch holding `batch_len` examples with running maxima
    /// `length` / `length_sq` can admit an example of effective length `this`.
    fn admits(&self, batch_len: usize, length: usize, length_sq: u64, this: usize) -> bool {
        let linear = (batch_len + 1) * length.max(this);
        let quadratic = (batch_len as u64 + 1) * length_sq.max((this as u64) * (this as u64));
        linear <= self.max_tokens
            && self
                .max_square_tokens
                .is_none_or(|budget| quadratic < budget)
    }
}

// ================================================================================================
/// Greedily packs a [`SortishSampler`]'s index stream into cost-bounded
/// batches, then synchronizes the batch count across replicas.
///
/// Packing is a single pass: an incoming index joins the current batch if the
/// batch would still fit the [`BatchBudget`], otherwise the batch is closed
/// and a new one starts. Because the input is approximately length-sorted, the
/// greedy pass approximates optimal token utilization without backtracking.
///
/// An example whose cost alone exceeds the budget can never be admitted. Such
/// indices are dropped from the epoch, recorded in
/// [`dropped_indices`](ApproxBatchSampler::dropped_indices), and logged.
///
/// Batches are built **eagerly in the constructor**. With more than one
/// replica the constructor performs a blocking max-reduction over local batch
/// counts and every replica in the group must reach it; shorter replicas then
/// extend their batch list by cyclic repetition so all replicas run the same
/// number of optimizer steps per epoch.
pub struct ApproxBatchSampler {
    batches: Vec<Vec<usize>>,
    dropped: Vec<usize>,
}

impl ApproxBatchSampler {
    /// Packs one epoch's worth of batches at the sampler's current epoch.
    ///
    /// `sample_lengths` is the same length table the sampler was built from.
    pub fn new(
        sampler: &SortishSampler,
        budget: &BatchBudget,
        sample_lengths: &[usize],
        comm: &dyn ReplicaComm,
    ) -> Result<Self> {
        budget.validate()?;
        ensure!(
            sample_lengths.len() == sampler.dataset_size(),
            "length table has {} entries but the sampler was built over {} examples",
            sample_lengths.len(),
            sampler.dataset_size(),
        );

        let mut batches: Vec<Vec<usize>> = Vec::new();
        let mut dropped: Vec<usize> = Vec::new();
        let mut batch: Vec<usize> = Vec::new();
        let mut length: usize = 0;
        let mut length_sq: u64 = 0;

        for index in sampler.iter(sampler.epoch()) {
            let this = budget.max_len.min(sample_lengths[index]);
            if budget.admits(batch.len(), length, length_sq, this) {
                batch.push(index);
                length = length.max(this);
                length_sq = length_sq.max((this as u64) * (this as u64));
                if batch.len() == budget.max_batch {
                    batches.push(std::mem::take(&mut batch));
                    length = 0;
                    length_sq = 0;
                }
            } else if batch.is_empty() {
                // This example exceeds the budget on its own and can never be
                // batched.
                tracing::warn!(
                    index,
                    effective_len = this,
                    "example exceeds the batch budget by itself; dropping it from the epoch"
                );
                dropped.push(index);
            } else {
                batches.push(std::mem::take(&mut batch));
                batch.push(index);
                length = this;
                length_sq = (this as u64) * (this as u64);
            }
        }
        if !batch.is_empty() {
            batches.push(batch);
        }

        if sampler.replica().is_distributed() {
            batches = Self::synchronize(batches, comm)?;
        }

        if !dropped.is_empty() {
            tracing::warn!(
                count = dropped.len(),
                "dropped examples whose cost alone exceeds the batch budget"
            );
        }
        Ok(Self { batches, dropped })
    }

    /// Equalizes the batch count across the replica group so distributed
    /// gradient synchronization never waits on a replica that ran out of
    /// batches early.
    fn synchronize(
        batches: Vec<Vec<usize>>,
        comm: &dyn ReplicaComm,
    ) -> Result<Vec<Vec<usize>>> {
        let local = batches.len() as u64;
        let target = comm.all_reduce_max(local)?;
        if local == target {
            return Ok(batches);
        }
        ensure!(
            local > 0,
            "this replica packed no batches but the group expects {target}"
        );

        let repeats = (target / local) as usize;
        let remainder = (target % local) as usize;
        let mut extended = Vec::with_capacity(target as usize);
        for _ in 0..repeats {
            extended.extend(batches.iter().cloned());
        }
        extended.extend(batches[..remainder].iter().cloned());
        ensure!(
            extended.len() == target as usize,
            "batch padding produced {} batches, expected {}",
            extended.len(),
            target,
        );
        Ok(extended)
    }

    /// Number of batches this replica runs per epoch, after synchronization.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Indices skipped this epoch because their cost alone exceeded the
    /// budget. Empty in a healthy configuration.
    pub fn dropped_indices(&self) -> &[usize] {
        &self.dropped
    }

    /// Consumes the sampler, returning the packed batches in order.
    pub fn into_batches(self) -> Vec<Vec<usize>> {
        self.batches
    }
}

impl Sampler for ApproxBatchSampler {
    type Item = Vec<usize>;

    /// Batches are fixed at construction; the epoch argument has no effect.
    fn iter(&self, _epoch: usize) -> Box<dyn Iterator<Item = Vec<usize>> + Send + '_> {
        Box::new(self.batches.iter().cloned())
    }
}

// ================================================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::{LocalGroup, SingleProcess};
    use std::collections::HashSet;
    use std::thread;

    mod random_sampler_tests {
        use super::*;

        #[test]
        fn rejects_empty_dataset() {
            assert!(RandomSampler::new(0, 42).is_err());
        }

        #[test]
        fn permutes_all_indices() -> Result<()> {
            let sampler = RandomSampler::new(50, 42)?;
            let indices: Vec<_> = sampler.iter(0).collect();
            assert_eq!(indices.len(), 50);
            assert_eq!(HashSet::<_>::from_iter(indices).len(), 50);
            Ok(())
        }

        #[test]
        fn deterministic_per_epoch() -> Result<()> {
            let sampler = RandomSampler::new(50, 42)?;
            let epoch1: Vec<_> = sampler.iter(1).collect();
            assert_eq!(epoch1, sampler.iter(1).collect::<Vec<_>>());
            assert_ne!(epoch1, sampler.iter(2).collect::<Vec<_>>());
            Ok(())
        }
    }

    mod batch_sampler_tests {
        use super::*;

        #[test]
        fn keeps_partial_batch() -> Result<()> {
            let sampler = BatchSampler::new(RandomSampler::new(5, 42)?, 2, false)?;
            let batches: Vec<_> = sampler.iter(0).collect();
            assert_eq!(batches.len(), 3);
            assert_eq!(batches[2].len(), 1);
            Ok(())
        }

        #[test]
        fn drops_partial_batch() -> Result<()> {
            let sampler = BatchSampler::new(RandomSampler::new(5, 42)?, 2, true)?;
            let batches: Vec<_> = sampler.iter(0).collect();
            assert_eq!(batches.len(), 2);
            assert!(batches.iter().all(|b| b.len() == 2));
            Ok(())
        }

        #[test]
        fn rejects_zero_batch_size() -> Result<()> {
            assert!(BatchSampler::new(RandomSampler::new(5, 42)?, 0, false).is_err());
            Ok(())
        }
    }

    mod sortish_sampler_tests {
        use super::*;

        #[test]
        fn rejects_invalid_args() {
            assert!(SortishSampler::new(&[], 2, ReplicaConfig::single()).is_err());
            assert!(SortishSampler::new(&[3, 1], 0, ReplicaConfig::single()).is_err());
        }

        #[test]
        fn single_replica_covers_every_index_once() -> Result<()> {
            let lengths: Vec<usize> = (0..97).map(|i| (i * 13) % 300).collect();
            let sampler = SortishSampler::new(&lengths, 10, ReplicaConfig::single())?;
            assert_eq!(sampler.len(), 97);

            let indices: Vec<_> = sampler.iter(0).collect();
            assert_eq!(indices.len(), 97);
            assert_eq!(HashSet::<_>::from_iter(indices).len(), 97);
            Ok(())
        }

        #[test]
        fn ranks_cover_every_index_with_padding() -> Result<()> {
            // 10 examples over 3 replicas: num_samples = 4, total = 12,
            // so two indices get duplicated by the prefix padding.
            let lengths: Vec<usize> = (0..10).map(|i| 5 * i + 1).collect();
            let num_replicas = 3;

            let mut all: Vec<usize> = Vec::new();
            for rank in 0..num_replicas {
                let replica = ReplicaConfig::new(num_replicas, rank)?;
                let sampler = SortishSampler::new(&lengths, 4, replica)?;
                let shard: Vec<_> = sampler.iter(0).collect();
                assert_eq!(shard.len(), sampler.len());
                assert_eq!(sampler.len(), 4);
                all.extend(shard);
            }

            assert_eq!(all.len(), 12);
            let unique: HashSet<_> = all.iter().copied().collect();
            assert_eq!(unique, (0..10).collect::<HashSet<_>>());
            Ok(())
        }

        #[test]
        fn epoch_controls_the_shuffle() -> Result<()> {
            let lengths: Vec<usize> = (0..100).map(|i| (i * 7) % 200).collect();
            let sampler = SortishSampler::new(&lengths, 8, ReplicaConfig::single())?;

            let epoch1: Vec<_> = sampler.iter(1).collect();
            let epoch1_again: Vec<_> = sampler.iter(1).collect();
            let epoch2: Vec<_> = sampler.iter(2).collect();
            assert_eq!(epoch1, epoch1_again);
            assert_ne!(epoch1, epoch2);
            Ok(())
        }

        #[test]
        fn set_epoch_feeds_the_stored_epoch() -> Result<()> {
            let lengths: Vec<usize> = (0..60).collect();
            let sampler = SortishSampler::new(&lengths, 5, ReplicaConfig::single())?;
            assert_eq!(sampler.epoch(), 0);

            sampler.set_epoch(7);
            assert_eq!(sampler.epoch(), 7);
            let via_stored: Vec<_> = sampler.iter(sampler.epoch()).collect();
            let direct: Vec<_> = sampler.iter(7).collect();
            assert_eq!(via_stored, direct);
            Ok(())
        }

        #[test]
        fn buckets_group_similar_lengths() -> Result<()> {
            // Lengths fall into two well-separated bands; with bucket_size
            // equal to a band's population, no bucket can mix the bands.
            let lengths = vec![10, 400, 20, 390, 15, 405];
            let sampler = SortishSampler::new(&lengths, 3, ReplicaConfig::single())?;

            for epoch in 0..5 {
                let order: Vec<_> = sampler.iter(epoch).collect();
                let halves = [&order[..3], &order[3..]];
                for half in halves {
                    let band_short = half.iter().all(|&i| lengths[i] < 100);
                    let band_long = half.iter().all(|&i| lengths[i] > 100);
                    assert!(
                        band_short || band_long,
                        "bucket mixed length bands at epoch {epoch}: {half:?}"
                    );
                }
            }
            Ok(())
        }

        #[test]
        fn more_replicas_than_examples() -> Result<()> {
            let lengths = vec![3, 9];
            for rank in 0..4 {
                let replica = ReplicaConfig::new(4, rank)?;
                let sampler = SortishSampler::new(&lengths, 2, replica)?;
                let shard: Vec<_> = sampler.iter(0).collect();
                assert_eq!(shard.len(), 1);
                assert!(shard[0] < 2);
            }
            Ok(())
        }
    }

    mod approx_batch_sampler_tests {
        use super::*;

        fn pack(
            lengths: &[usize],
            bucket_size: usize,
            budget: BatchBudget,
        ) -> Result<ApproxBatchSampler> {
            let sampler = SortishSampler::new(lengths, bucket_size, ReplicaConfig::single())?;
            ApproxBatchSampler::new(&sampler, &budget, lengths, &SingleProcess)
        }

        #[test]
        fn respects_linear_budget_and_cardinality() -> Result<()> {
            let lengths: Vec<usize> = (0..200).map(|i| (i * 31) % 700 + 1).collect();
            let budget = BatchBudget::new(2048, 16);
            let packer = pack(&lengths, 20, budget.clone())?;

            assert!(packer.dropped_indices().is_empty());
            let mut seen = 0usize;
            for batch in packer.iter(0) {
                assert!(!batch.is_empty());
                assert!(batch.len() <= budget.max_batch);
                let longest = batch
                    .iter()
                    .map(|&i| budget.max_len.min(lengths[i]))
                    .max()
                    .unwrap();
                assert!(
                    batch.len() * longest <= budget.max_tokens,
                    "batch of {} examples with longest {} exceeds {}",
                    batch.len(),
                    longest,
                    budget.max_tokens,
                );
                seen += batch.len();
            }
            assert_eq!(seen, lengths.len());
            Ok(())
        }

        #[test]
        fn never_pairs_long_with_short_past_budget() -> Result<()> {
            // A batch such as {400, 15} would cost 2 * 400 = 800 > 420 and
            // must never be produced.
            let lengths = vec![10, 400, 20, 390, 15, 405];
            let budget = BatchBudget::new(420, 4);
            let packer = pack(&lengths, 2, budget.clone())?;

            assert!(packer.dropped_indices().is_empty());
            let mut seen = 0usize;
            for batch in packer.iter(0) {
                let longest = batch.iter().map(|&i| lengths[i]).max().unwrap();
                assert!(batch.len() * longest <= 420, "violating batch: {batch:?}");
                seen += batch.len();
            }
            assert_eq!(seen, 6);
            Ok(())
        }

        #[test]
        fn quadratic_budget_limits_batches() -> Result<()> {
            let lengths = vec![100; 10];
            // Linear budget admits 10 per batch, quadratic admits at most 3:
            // 4 * 100^2 = 40_000 is not < 40_000.
            let budget = BatchBudget::new(10_000, 100).with_max_square_tokens(40_000);
            let packer = pack(&lengths, 10, budget)?;

            for batch in packer.iter(0) {
                assert!(batch.len() <= 3, "quadratic budget exceeded: {batch:?}");
            }
            Ok(())
        }

        #[test]
        fn oversize_singleton_is_dropped_and_reported() -> Result<()> {
            let lengths = vec![1000];
            let budget = BatchBudget::new(420, 4);
            // Effective length min(512, 1000) = 512; 1 * 512 > 420.
            let packer = pack(&lengths, 2, budget)?;

            assert_eq!(packer.len(), 0);
            assert_eq!(packer.dropped_indices(), &[0]);
            Ok(())
        }

        #[test]
        fn max_len_caps_effective_length() -> Result<()> {
            // Raw lengths far exceed the linear budget, but capped at
            // max_len = 100 two of them fit a 200-token batch.
            let lengths = vec![5000, 6000, 7000, 8000];
            let budget = BatchBudget::new(200, 8).with_max_len(100);
            let packer = pack(&lengths, 4, budget)?;

            assert!(packer.dropped_indices().is_empty());
            let batches: Vec<_> = packer.iter(0).collect();
            assert_eq!(batches.len(), 2);
            assert!(batches.iter().all(|b| b.len() == 2));
            Ok(())
        }

        #[test]
        fn closing_at_max_batch_resets_running_maxima() -> Result<()> {
            // All equal lengths, max_batch = 2: every batch must hold exactly
            // two examples, including the ones after a cardinality close.
            let lengths = vec![50; 8];
            let budget = BatchBudget::new(100, 2).with_max_square_tokens(5001);
            let packer = pack(&lengths, 8, budget)?;

            let batches: Vec<_> = packer.iter(0).collect();
            assert_eq!(batches.len(), 4);
            assert!(batches.iter().all(|b| b.len() == 2));
            Ok(())
        }

        #[test]
        fn repeated_iteration_yields_the_same_batches() -> Result<()> {
            let lengths: Vec<usize> = (0..40).map(|i| i + 1).collect();
            let packer = pack(&lengths, 8, BatchBudget::new(64, 4))?;
            let first: Vec<_> = packer.iter(0).collect();
            let second: Vec<_> = packer.iter(3).collect();
            assert_eq!(first, second);
            Ok(())
        }

        #[test]
        fn rejects_mismatched_length_table() -> Result<()> {
            let lengths = vec![5, 6, 7];
            let sampler = SortishSampler::new(&lengths, 2, ReplicaConfig::single())?;
            let wrong = vec![5, 6];
            let result =
                ApproxBatchSampler::new(&sampler, &BatchBudget::new(64, 4), &wrong, &SingleProcess);
            assert!(result.is_err());
            Ok(())
        }

        #[test]
        fn replicas_agree_on_batch_count() -> Result<()> {
            // Skewed lengths make the per-rank packings differ in count; the
            // reduction must still equalize them.
            let lengths: Vec<usize> = (0..37).map(|i| (i * 97) % 500 + 1).collect();
            let num_replicas = 3;
            let group = LocalGroup::new(num_replicas)?;

            let handles: Vec<_> = (0..num_replicas)
                .map(|rank| {
                    let lengths = lengths.clone();
                    let group = group.clone();
                    thread::spawn(move || -> Result<(usize, usize)> {
                        let replica = ReplicaConfig::new(num_replicas, rank)?;
                        let sampler = SortishSampler::new(&lengths, 5, replica)?;
                        let packer = ApproxBatchSampler::new(
                            &sampler,
                            &BatchBudget::new(600, 4),
                            &lengths,
                            &group,
                        )?;
                        let total: usize = packer.iter(0).map(|b| b.len()).sum();
                        Ok((packer.len(), total))
                    })
                })
                .collect();

            let results: Vec<(usize, usize)> = handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect();

            let counts: HashSet<usize> = results.iter().map(|&(count, _)| count).collect();
            assert_eq!(counts.len(), 1, "replica batch counts diverge: {results:?}");
            assert!(*counts.iter().next().unwrap() > 0);
            Ok(())
        }
    }
}
