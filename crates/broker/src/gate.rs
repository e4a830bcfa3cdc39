//! Partition commit gate (§4.2): allows out-of-order completion within a
//! partition while only ever committing a contiguous prefix of offsets.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline_core::error::GateError;

/// Broker-facing "store the next offset to read" call, decoupled from any
/// concrete client so the gate is unit-testable without rdkafka.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    async fn store_offset(&self, topic: &str, partition: i32, offset: i64)
        -> Result<(), GateError>;
}

/// Broker-facing immediate commit call, used on partition revoke.
#[async_trait]
pub trait OffsetCommitter: Send + Sync {
    async fn commit_offset(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<(), GateError>;
}

struct GateState {
    next_commit: i64,
    done: BTreeSet<i64>,
}

/// Per-partition reordering barrier (§4.2).
pub struct PartitionGate {
    topic: String,
    partition: i32,
    initialized: AtomicBool,
    state: Mutex<GateState>,
}

impl PartitionGate {
    /// Creates a gate already calibrated to `start_offset` — used when the
    /// consumer runtime resolves a real starting offset from the
    /// group-coordinator or the low-watermark at assignment time (§4.3).
    pub fn new(topic: impl Into<String>, partition: i32, start_offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            initialized: AtomicBool::new(true),
            state: Mutex::new(GateState {
                next_commit: start_offset,
                done: BTreeSet::new(),
            }),
        }
    }

    /// Creates an uninitialized gate; the first call to `ensure_init`
    /// calibrates `next_commit` to the first actually-observed offset.
    pub fn uninitialized(topic: impl Into<String>, partition: i32, fallback_start: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            initialized: AtomicBool::new(false),
            state: Mutex::new(GateState {
                next_commit: fallback_start,
                done: BTreeSet::new(),
            }),
        }
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// `EnsureInit(firstObservedOffset)` (§4.2): exactly once per gate, if
    /// uninitialized and the observed offset is above the recorded start,
    /// raises `next_commit` and drops any stale `done` entries below it.
    pub fn ensure_init(&self, first_observed_offset: i64) {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let mut state = self.state.lock();
        if first_observed_offset > state.next_commit {
            state.next_commit = first_observed_offset;
            state.done.retain(|&o| o >= first_observed_offset);
        }
    }

    /// `MarkDone(offset)` (§4.2): idempotent; a duplicate is a no-op.
    /// Offsets below `next_commit` are never stored.
    pub fn mark_done(&self, offset: i64) {
        let mut state = self.state.lock();
        if offset >= state.next_commit {
            state.done.insert(offset);
        }
    }

    /// Current backlog size, for observability (`GetBacklog`).
    pub fn backlog(&self) -> usize {
        self.state.lock().done.len()
    }

    pub fn next_commit(&self) -> i64 {
        self.state.lock().next_commit
    }

    /// Advances `next_commit` past the contiguous prefix currently in
    /// `done`, without calling into the broker. Returns the new
    /// `next_commit` if progress was made, else `None`. The gate mutex is
    /// released before any broker call by design — this method never
    /// touches the network itself.
    fn advance_locked(&self) -> Option<i64> {
        let mut state = self.state.lock();
        let start = state.next_commit;
        while state.done.remove(&state.next_commit) {
            state.next_commit += 1;
        }
        if state.next_commit > start {
            Some(state.next_commit)
        } else {
            None
        }
    }

    /// `StoreContiguous(store)` (§4.2): advances past the contiguous
    /// prefix, then — if progress was made — asks the broker client to
    /// store `next_commit` as the next offset to read. Returns the stored
    /// offset, or `-1` if no progress was made.
    pub async fn store_contiguous(&self, store: &dyn OffsetStore) -> Result<i64, GateError> {
        match self.advance_locked() {
            Some(new_next_commit) => {
                store
                    .store_offset(&self.topic, self.partition, new_next_commit)
                    .await?;
                Ok(new_next_commit)
            }
            None => Ok(-1),
        }
    }

    /// `CommitContiguous(commit)` (§4.2): same advance logic, but performs
    /// an immediate commit — used on partition revoke.
    pub async fn commit_contiguous(
        &self,
        committer: &dyn OffsetCommitter,
    ) -> Result<i64, GateError> {
        match self.advance_locked() {
            Some(new_next_commit) => {
                committer
                    .commit_offset(&self.topic, self.partition, new_next_commit)
                    .await?;
                Ok(new_next_commit)
            }
            None => Ok(-1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeStore {
        stored: StdMutex<Vec<(i32, i64)>>,
    }

    #[async_trait]
    impl OffsetStore for FakeStore {
        async fn store_offset(
            &self,
            _topic: &str,
            partition: i32,
            offset: i64,
        ) -> Result<(), GateError> {
            self.stored.lock().unwrap().push((partition, offset));
            Ok(())
        }
    }

    #[async_trait]
    impl OffsetCommitter for FakeStore {
        async fn commit_offset(
            &self,
            _topic: &str,
            partition: i32,
            offset: i64,
        ) -> Result<(), GateError> {
            self.stored.lock().unwrap().push((partition, offset));
            Ok(())
        }
    }

    // Scenario 1 (§8): Gate sequential advance.
    #[tokio::test]
    async fn sequential_advance_respects_gaps() {
        let gate = PartitionGate::new("topic-a", 0, 0);
        let store = FakeStore::default();

        gate.mark_done(0);
        assert_eq!(gate.store_contiguous(&store).await.unwrap(), 1);

        gate.mark_done(2);
        assert_eq!(gate.store_contiguous(&store).await.unwrap(), -1);
        assert_eq!(gate.backlog(), 1);

        gate.mark_done(1);
        assert_eq!(gate.store_contiguous(&store).await.unwrap(), 3);

        assert_eq!(*store.stored.lock().unwrap(), vec![(0, 1), (0, 3)]);
    }

    // Scenario 2 (§8): Gate calibration.
    #[tokio::test]
    async fn calibrates_to_first_observed_offset() {
        let gate = PartitionGate::uninitialized("topic-a", 0, 0);
        gate.ensure_init(5);
        assert_eq!(gate.next_commit(), 5);

        let store = FakeStore::default();
        gate.mark_done(5);
        assert_eq!(gate.store_contiguous(&store).await.unwrap(), 6);
    }

    #[test]
    fn ensure_init_only_calibrates_once() {
        let gate = PartitionGate::uninitialized("topic-a", 0, 0);
        gate.ensure_init(5);
        gate.ensure_init(100);
        assert_eq!(gate.next_commit(), 5);
    }

    #[test]
    fn duplicate_mark_done_is_idempotent() {
        let gate = PartitionGate::new("topic-a", 0, 0);
        gate.mark_done(3);
        gate.mark_done(3);
        assert_eq!(gate.backlog(), 1);
    }

    #[test]
    fn offsets_below_next_commit_are_never_stored() {
        let gate = PartitionGate::new("topic-a", 0, 10);
        gate.mark_done(3);
        assert_eq!(gate.backlog(), 0);
    }

    #[tokio::test]
    async fn commit_contiguous_uses_committer_not_store() {
        let gate = PartitionGate::new("topic-a", 0, 0);
        let committer = FakeStore::default();
        gate.mark_done(0);
        assert_eq!(gate.commit_contiguous(&committer).await.unwrap(), 1);
        assert_eq!(*committer.stored.lock().unwrap(), vec![(0, 1)]);
    }
}
