//! Uniqueness store
//!
//! Records, for every consumed state, the transaction that consumed it. A
//! state is committed at most once; committing it again under the same
//! transaction is a no-op, under a different one a conflict.
//!
//! [`ShardedUniquenessStore`] partitions states across mutex-guarded shards.
//! A commit locks every shard its states fall in, in ascending shard order,
//! so requests over overlapping states serialise while disjoint requests run
//! in parallel without deadlock.

use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tessera_core::{PartyName, SecureHash};
use tessera_ledger::StateRef;
use tracing::{debug, warn};

use crate::error::ConsumingTx;

/// Result of an atomic commit attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    /// All states are now consumed by the transaction
    Committed,
    /// All states were already consumed by this same transaction
    AlreadyCommitted,
    /// Some states are consumed by other transactions; nothing was written
    Conflict(BTreeMap<StateRef, ConsumingTx>),
}

/// Consumed-state registry shared by every notary flow on a node
pub trait UniquenessProvider: Send + Sync {
    /// Current consumers of any of `states`
    fn lookup(&self, states: &[StateRef]) -> BTreeMap<StateRef, ConsumingTx>;

    /// Atomically mark `states` consumed by `tx_id`
    fn try_commit(
        &self,
        tx_id: SecureHash,
        states: &[StateRef],
        requesting_party: &PartyName,
    ) -> CommitResult;
}

type Shard = HashMap<StateRef, ConsumingTx>;

/// In-memory [`UniquenessProvider`] with per-shard locking
#[derive(Debug)]
pub struct ShardedUniquenessStore {
    shards: Vec<Mutex<Shard>>,
}

impl Default for ShardedUniquenessStore {
    fn default() -> Self {
        Self::new(16)
    }
}

impl ShardedUniquenessStore {
    /// Store with `shards` shards (at least one)
    pub fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    /// Number of committed states
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Whether nothing has been committed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_of(&self, state: &StateRef) -> usize {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&state.tx_id.as_bytes()[..8]);
        let spread = u64::from_le_bytes(prefix).wrapping_add(u64::from(state.index));
        (spread % self.shards.len() as u64) as usize
    }

    /// Lock every shard touched by `states`, lowest index first
    fn lock(&self, states: &[StateRef]) -> BTreeMap<usize, MutexGuard<'_, Shard>> {
        let indices: BTreeSet<usize> = states.iter().map(|s| self.shard_of(s)).collect();
        indices
            .into_iter()
            .map(|i| (i, self.shards[i].lock()))
            .collect()
    }
}

impl UniquenessProvider for ShardedUniquenessStore {
    fn lookup(&self, states: &[StateRef]) -> BTreeMap<StateRef, ConsumingTx> {
        let guards = self.lock(states);
        states
            .iter()
            .filter_map(|state| {
                guards
                    .get(&self.shard_of(state))
                    .and_then(|shard| shard.get(state))
                    .map(|consumer| (*state, consumer.clone()))
            })
            .collect()
    }

    fn try_commit(
        &self,
        tx_id: SecureHash,
        states: &[StateRef],
        requesting_party: &PartyName,
    ) -> CommitResult {
        let mut guards = self.lock(states);

        let mut conflicts = BTreeMap::new();
        let mut already = 0usize;
        for state in states {
            let consumer = guards
                .get(&self.shard_of(state))
                .and_then(|shard| shard.get(state));
            match consumer {
                Some(c) if c.tx_id == tx_id => already += 1,
                Some(c) => {
                    conflicts.insert(*state, c.clone());
                }
                None => {}
            }
        }

        if !conflicts.is_empty() {
            warn!(tx_id = %tx_id, conflicts = conflicts.len(), "Uniqueness conflict");
            return CommitResult::Conflict(conflicts);
        }
        if !states.is_empty() && already == states.len() {
            debug!(tx_id = %tx_id, "States already committed by this transaction");
            return CommitResult::AlreadyCommitted;
        }

        for (index, state) in states.iter().enumerate() {
            let shard_index = self.shard_of(state);
            if let Some(shard) = guards.get_mut(&shard_index) {
                shard.entry(*state).or_insert_with(|| ConsumingTx {
                    tx_id,
                    input_index: u32::try_from(index).unwrap_or(u32::MAX),
                    requesting_party: requesting_party.clone(),
                });
            }
        }
        debug!(tx_id = %tx_id, states = states.len(), "States committed");
        CommitResult::Committed
    }
}
