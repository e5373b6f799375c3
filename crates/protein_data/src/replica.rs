use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex};

/// Identifies this process's shard of a distributed data-parallel group.
///
/// Samplers take this explicitly; querying the ambient distributed runtime for
/// world size and rank is the caller's job, done once at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Total number of participant processes in the group.
    pub num_replicas: usize,
    /// This process's rank, in `[0, num_replicas)`.
    pub rank: usize,
}

impl ReplicaConfig {
    pub fn new(num_replicas: usize, rank: usize) -> Result<Self> {
        ensure!(num_replicas > 0, "num_replicas must be > 0");
        ensure!(
            rank < num_replicas,
            "invalid rank {rank}, rank should be in the interval [0, {}]",
            num_replicas.saturating_sub(1)
        );
        Ok(Self { num_replicas, rank })
    }

    /// The single-process default: one replica, rank 0.
    pub fn single() -> Self {
        Self {
            num_replicas: 1,
            rank: 0,
        }
    }

    pub fn is_distributed(&self) -> bool {
        self.num_replicas > 1
    }
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self::single()
    }
}

/// Collective communication over the replica group.
///
/// The one collective the batching layer needs is a max-reduction over batch
/// counts. Implementations block until every replica in the group has made the
/// matching call; a replica that never reaches the call stalls the whole group.
pub trait ReplicaComm: Send + Sync {
    fn all_reduce_max(&self, value: u64) -> Result<u64>;
}

/// The trivial group of one: every reduction returns its own input.
#[derive(Debug, Default)]
pub struct SingleProcess;

impl ReplicaComm for SingleProcess {
    fn all_reduce_max(&self, value: u64) -> Result<u64> {
        Ok(value)
    }
}

/// An in-process replica group backed by a barrier, for multi-replica runs
/// hosted in one process (one thread per rank). Clone one handle per rank.
///
/// # Example
/// ```ignore
/// let group = LocalGroup::new(2)?;
/// let g0 = group.clone();
/// let g1 = group;
/// // On two threads:
/// assert_eq!(g0.all_reduce_max(3)?, 7);
/// assert_eq!(g1.all_reduce_max(7)?, 7);
/// ```
#[derive(Clone)]
pub struct LocalGroup {
    shared: Arc<GroupShared>,
}

struct GroupShared {
    size: usize,
    state: Mutex<GroupState>,
    cvar: Condvar,
}

struct GroupState {
    arrived: usize,
    pending_max: u64,
    result: u64,
    generation: u64,
}

impl LocalGroup {
    pub fn new(size: usize) -> Result<Self> {
        ensure!(size > 0, "replica group size must be > 0");
        Ok(Self {
            shared: Arc::new(GroupShared {
                size,
                state: Mutex::new(GroupState {
                    arrived: 0,
                    pending_max: 0,
                    result: 0,
                    generation: 0,
                }),
                cvar: Condvar::new(),
            }),
        })
    }

    pub fn size(&self) -> usize {
        self.shared.size
    }
}

impl ReplicaComm for LocalGroup {
    /// Blocks until all `size` members have contributed a value, then returns
    /// the maximum to every member.
    fn all_reduce_max(&self, value: u64) -> Result<u64> {
        let mut state = self
            .shared
            .state
            .lock()
            .expect("replica group lock poisoned");
        let generation = state.generation;
        state.pending_max = state.pending_max.max(value);
        state.arrived += 1;

        if state.arrived == self.shared.size {
            // Last member of this round publishes the result and opens the
            // next round.
            state.result = state.pending_max;
            state.arrived = 0;
            state.pending_max = 0;
            state.generation += 1;
            self.shared.cvar.notify_all();
            return Ok(state.result);
        }

        while state.generation == generation {
            state = self
                .shared
                .cvar
                .wait(state)
                .expect("replica group lock poisoned");
        }
        Ok(state.result)
    }
}
