//! Partition sequencer (§4.4): optional in-partition offset-order
//! re-serializer for business layers that require strictly ordered
//! delivery even though fetches are concurrent.

use std::collections::BTreeMap;
use std::future::Future;

use parking_lot::Mutex;
use telemetry::metrics;
use tracing::debug;

struct SequencerState<M> {
    next: i64,
    buf: BTreeMap<i64, M>,
}

/// Wraps dispatch so the downstream handler observes a strictly
/// monotonically increasing offset sequence per partition, even if
/// `push` is called out of order.
pub struct PartitionSequencer<M> {
    partition: i32,
    state: Mutex<SequencerState<M>>,
}

impl<M> PartitionSequencer<M> {
    pub fn new(partition: i32, start_offset: i64) -> Self {
        Self {
            partition,
            state: Mutex::new(SequencerState {
                next: start_offset,
                buf: BTreeMap::new(),
            }),
        }
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// `Push(offset, msg)` (§4.4). A late duplicate (`offset < next`) is
    /// acknowledged via `on_late_duplicate` and dropped. Otherwise the
    /// message is buffered, and every contiguous-ready prefix is drained
    /// and delivered via `deliver` — with the lock released across each
    /// delivery call so a slow handler never blocks unrelated pushes.
    pub async fn push<F, Fut>(
        &self,
        offset: i64,
        msg: M,
        on_late_duplicate: impl FnOnce(&M),
        deliver: F,
    ) where
        F: Fn(M) -> Fut,
        Fut: Future<Output = ()>,
    {
        let ready = {
            let mut state = self.state.lock();
            if offset < state.next {
                debug!(
                    partition = self.partition,
                    offset,
                    next = state.next,
                    "late duplicate arrival, acknowledging without redelivery"
                );
                on_late_duplicate(&msg);
                metrics().sequencer_late_duplicates.inc();
                return;
            }

            state.buf.insert(offset, msg);

            let mut ready = Vec::new();
            while let Some(next_msg) = state.buf.remove(&state.next) {
                ready.push(next_msg);
                state.next += 1;
            }
            metrics().sequencer_buffered.set(state.buf.len() as u64);
            ready
        };

        for msg in ready {
            deliver(msg).await;
        }
    }

    pub fn next_offset(&self) -> i64 {
        self.state.lock().next
    }

    pub fn buffered(&self) -> usize {
        self.state.lock().buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn delivers_in_strict_offset_order_despite_out_of_order_pushes() {
        let sequencer = PartitionSequencer::new(0, 0);
        let delivered: Arc<AsyncMutex<Vec<i64>>> = Arc::new(AsyncMutex::new(Vec::new()));

        let deliver = |offset: i64| {
            let delivered = delivered.clone();
            async move {
                delivered.lock().await.push(offset);
            }
        };

        sequencer.push(2, 2i64, |_| {}, deliver).await;
        assert_eq!(sequencer.buffered(), 1);
        assert!(delivered.lock().await.is_empty());

        sequencer.push(0, 0i64, |_| {}, deliver).await;
        sequencer.push(1, 1i64, |_| {}, deliver).await;

        assert_eq!(*delivered.lock().await, vec![0, 1, 2]);
        assert_eq!(sequencer.next_offset(), 3);
    }

    #[tokio::test]
    async fn late_duplicate_is_acknowledged_without_redelivery() {
        let sequencer = PartitionSequencer::new(0, 5);
        let ack_count = Arc::new(AtomicI64::new(0));
        let ack_count2 = ack_count.clone();

        sequencer
            .push(
                3,
                3i64,
                move |_| {
                    ack_count2.fetch_add(1, Ordering::SeqCst);
                },
                |_: i64| async {},
            )
            .await;

        assert_eq!(ack_count.load(Ordering::SeqCst), 1);
        assert_eq!(sequencer.next_offset(), 5);
    }
}
