//! Consumer runtime (§4.3): cooperative-sticky rebalancing over `rdkafka`,
//! bounded concurrent dispatch, and a batched commit pipeline.
//!
//! Grounded on `kafka_consumer.rs`'s `CustomContext`/`LoggingConsumer`
//! shape, upgraded from per-loop `TopicPartitionList` handling to
//! incremental cooperative-sticky assignment, and on the teacher's
//! `Producer::start_flush_task` background-task idiom for the batch
//! commit manager.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock as SyncRwLock;
use pipeline_core::ack::{AckHandle, InboundMessage};
use pipeline_core::error::{BrokerError, GateError};
use rdkafka::consumer::{
    BaseConsumer, CommitMode, Consumer as _, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::{ClientConfig, ClientContext, Offset};
use telemetry::metrics;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConsumerRuntimeConfig;
use crate::gate::{OffsetCommitter, OffsetStore, PartitionGate};
use crate::sequencer::PartitionSequencer;

/// `MaxInflightPerPartition`/`MaxInflightGlobal` document `0` as
/// "unlimited" (§6). `Semaphore::new(0)` would instead permanently block
/// every `acquire`, so translate `0` into an effectively-unbounded permit
/// count.
fn effective_permits(configured: usize) -> usize {
    if configured == 0 {
        usize::MAX / 2
    } else {
        configured
    }
}

type GateKey = (String, i32);
type GateMap = Arc<SyncRwLock<HashMap<GateKey, Arc<PartitionGate>>>>;
type SemaphoreMap = Arc<SyncRwLock<HashMap<GateKey, Arc<Semaphore>>>>;
type SequencerMap =
    Arc<SyncRwLock<HashMap<GateKey, Arc<PartitionSequencer<InboundMessage<Vec<u8>>>>>>>;

/// Tracks store-offset notifications between batch-commit flushes.
struct PendingOffsets {
    map: SyncRwLock<HashMap<GateKey, i64>>,
    notify: Notify,
    max_pending: usize,
}

impl PendingOffsets {
    fn new(max_pending: usize) -> Self {
        Self {
            map: SyncRwLock::new(HashMap::new()),
            notify: Notify::new(),
            max_pending,
        }
    }

    fn record(&self, topic: &str, partition: i32, offset: i64) {
        let mut map = self.map.write();
        map.insert((topic.to_string(), partition), offset);
        let pending = map.len();
        drop(map);
        if pending >= self.max_pending {
            self.notify.notify_one();
        }
    }

    fn drain(&self) -> HashMap<GateKey, i64> {
        std::mem::take(&mut *self.map.write())
    }
}

/// `OffsetStore`/`OffsetCommitter` implementation backed by a live
/// `StreamConsumer`. `store_offset` only records the notification for the
/// batch manager; `commit_offset` performs an immediate synchronous
/// commit, used on partition revoke.
pub struct KafkaOffsetClient {
    consumer: Arc<StreamConsumer<RuntimeContext>>,
    pending: Arc<PendingOffsets>,
}

#[async_trait]
impl OffsetStore for KafkaOffsetClient {
    async fn store_offset(&self, topic: &str, partition: i32, offset: i64) -> Result<(), GateError> {
        self.pending.record(topic, partition, offset);
        metrics().offsets_stored.inc();
        Ok(())
    }
}

#[async_trait]
impl OffsetCommitter for KafkaOffsetClient {
    async fn commit_offset(&self, topic: &str, partition: i32, offset: i64) -> Result<(), GateError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(topic, partition, Offset::Offset(offset))
            .map_err(|e| GateError::CommitFailed(e.to_string()))?;
        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| GateError::CommitFailed(e.to_string()))?;
        metrics().offsets_committed.inc();
        Ok(())
    }
}

/// `rdkafka` consumer context driving the cooperative-sticky incremental
/// rebalance protocol (§4.3's "Subscription & rebalance protocol").
pub struct RuntimeContext {
    gates: GateMap,
    semaphores: SemaphoreMap,
    sequencers: SequencerMap,
    uses_sequencer: bool,
    hooks: pipeline_core::hooks::LifecycleHooks,
    per_partition_inflight: usize,
    drain_timeout: Duration,
}

impl ClientContext for RuntimeContext {}

impl ConsumerContext for RuntimeContext {
    fn pre_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        if let Rebalance::Revoke(tpl) = rebalance {
            // Best-effort wait for in-flight handlers to drain before the
            // partition is actually taken away; a slow handler past the
            // deadline just proceeds (§4.3). `drain_timeout == 0` means
            // wait forever rather than "don't wait at all" (§6).
            let deadline = (!self.drain_timeout.is_zero()).then(|| Instant::now() + self.drain_timeout);
            for elem in tpl.elements() {
                let key = (elem.topic().to_string(), elem.partition());
                if let Some(sem) = self.semaphores.read().get(&key).cloned() {
                    while sem.available_permits() < self.per_partition_inflight
                        && deadline.map_or(true, |d| Instant::now() < d)
                    {
                        std::thread::sleep(Duration::from_millis(25));
                    }
                    if sem.available_permits() < self.per_partition_inflight {
                        warn!(
                            topic = %elem.topic(),
                            partition = elem.partition(),
                            "partition drain timed out, proceeding with revoke"
                        );
                    }
                }
            }
        }
    }

    fn post_rebalance(&self, base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        metrics().rebalance_events.inc();
        match rebalance {
            Rebalance::Assign(tpl) => {
                for elem in tpl.elements() {
                    let topic = elem.topic().to_string();
                    let partition = elem.partition();
                    let start_offset = resolve_start_offset(base_consumer, &topic, partition);

                    self.gates.write().insert(
                        (topic.clone(), partition),
                        Arc::new(PartitionGate::new(topic.clone(), partition, start_offset)),
                    );
                    self.semaphores.write().insert(
                        (topic.clone(), partition),
                        Arc::new(Semaphore::new(self.per_partition_inflight)),
                    );
                    if self.uses_sequencer {
                        self.sequencers.write().insert(
                            (topic.clone(), partition),
                            Arc::new(PartitionSequencer::new(partition, start_offset)),
                        );
                    }

                    info!(topic = %topic, partition, start_offset, "partition assigned");
                    self.hooks.fire_assigned(&topic, partition, start_offset);
                }

                if let Err(err) = base_consumer.incremental_assign(tpl) {
                    warn!(error = %err, "incremental_assign failed");
                }
                metrics().partitions_assigned.set(self.gates.read().len() as u64);
            }
            Rebalance::Revoke(tpl) => {
                for elem in tpl.elements() {
                    let topic = elem.topic().to_string();
                    let partition = elem.partition();

                    if let Some(gate) = self.gates.read().get(&(topic.clone(), partition)).cloned()
                    {
                        let committer = SyncCommitter { consumer: base_consumer };
                        if let Err(err) =
                            futures::executor::block_on(gate.commit_contiguous(&committer))
                        {
                            warn!(topic = %topic, partition, error = %err, "final commit on revoke failed");
                        }
                    }

                    self.gates.write().remove(&(topic.clone(), partition));
                    self.semaphores.write().remove(&(topic.clone(), partition));
                    self.sequencers.write().remove(&(topic.clone(), partition));

                    info!(topic = %topic, partition, "partition revoked");
                    self.hooks.fire_revoked(&topic, partition);
                }

                if let Err(err) = base_consumer.incremental_unassign(tpl) {
                    warn!(error = %err, "incremental_unassign failed");
                }
                metrics().partitions_assigned.set(self.gates.read().len() as u64);
            }
            Rebalance::Error(err) => {
                warn!(error = %err, "rebalance error");
                // rdkafka's `Rebalance` enum doesn't carry a partition list
                // on the error path, so there's no per-partition context to
                // report here; fire with a sentinel so `onLost` is at least
                // reachable rather than permanently dead.
                self.hooks.fire_lost("", -1);
            }
        }
    }
}

/// Synchronous `OffsetCommitter` used only from inside the rebalance
/// callback, where we already hold a `&BaseConsumer` and must not spawn an
/// async task.
struct SyncCommitter<'a> {
    consumer: &'a BaseConsumer<RuntimeContext>,
}

#[async_trait]
impl<'a> OffsetCommitter for SyncCommitter<'a> {
    async fn commit_offset(&self, topic: &str, partition: i32, offset: i64) -> Result<(), GateError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(topic, partition, Offset::Offset(offset))
            .map_err(|e| GateError::CommitFailed(e.to_string()))?;
        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| GateError::CommitFailed(e.to_string()))?;
        metrics().offsets_committed.inc();
        Ok(())
    }
}

fn resolve_start_offset(consumer: &BaseConsumer<RuntimeContext>, topic: &str, partition: i32) -> i64 {
    let mut tpl = TopicPartitionList::new();
    let _ = tpl.add_partition(topic, partition);

    if let Ok(committed) = consumer.committed_offsets(tpl, Duration::from_secs(5)) {
        for elem in committed.elements() {
            if elem.topic() == topic && elem.partition() == partition {
                if let Offset::Offset(o) = elem.offset() {
                    return o;
                }
            }
        }
    }

    match consumer.fetch_watermarks(topic, partition, Duration::from_secs(5)) {
        Ok((low, _high)) => low,
        Err(err) => {
            warn!(topic, partition, error = %err, "watermark fetch failed, falling back to 0");
            0
        }
    }
}

/// Background task flushing store-offset notifications periodically or
/// once `max_pending` is reached (§4.3 "Batch commit manager").
struct BatchCommitManager {
    consumer: Arc<StreamConsumer<RuntimeContext>>,
    pending: Arc<PendingOffsets>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl BatchCommitManager {
    fn spawn(
        consumer: Arc<StreamConsumer<RuntimeContext>>,
        pending: Arc<PendingOffsets>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let manager = BatchCommitManager {
            consumer,
            pending,
            interval,
            shutdown,
        };
        tokio::spawn(manager.run())
    }

    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.flush();
                    return;
                }
                _ = ticker.tick() => {
                    self.flush();
                }
                _ = self.pending.notify.notified() => {
                    self.flush();
                }
            }
        }
    }

    /// Builds one multi-partition `TopicPartitionList` out of all pending
    /// notifications and commits it in one call. Per-topic success/failure
    /// is reported; failed topics keep their pending entries for the next
    /// cycle (§4.3).
    fn flush(&self) {
        let pending = self.pending.drain();
        if pending.is_empty() {
            return;
        }

        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), offset) in &pending {
            if let Err(err) = tpl.add_partition_offset(topic, *partition, Offset::Offset(*offset)) {
                warn!(topic, partition, error = %err, "skipping malformed pending offset");
            }
        }

        match self.consumer.commit(&tpl, CommitMode::Async) {
            Ok(()) => debug!(count = pending.len(), "batch commit flushed"),
            Err(err) => {
                warn!(error = %err, "batch commit failed, re-queuing pending offsets");
                for ((topic, partition), offset) in pending {
                    self.pending.record(&topic, partition, offset);
                }
            }
        }
    }
}

/// Bounded-concurrency dispatch and rebalance-aware runtime wrapping a
/// single `StreamConsumer` (§4.3).
pub struct ConsumerRuntime {
    consumer: Arc<StreamConsumer<RuntimeContext>>,
    gates: GateMap,
    semaphores: SemaphoreMap,
    sequencers: SequencerMap,
    global_inflight: Arc<Semaphore>,
    offset_client: Arc<KafkaOffsetClient>,
    batch_manager: tokio::task::JoinHandle<()>,
    shutdown: CancellationToken,
    config: ConsumerRuntimeConfig,
}

impl ConsumerRuntime {
    pub fn new(config: ConsumerRuntimeConfig) -> Result<Self, BrokerError> {
        let gates: GateMap = Arc::new(SyncRwLock::new(HashMap::new()));
        let semaphores: SemaphoreMap = Arc::new(SyncRwLock::new(HashMap::new()));
        let sequencers: SequencerMap = Arc::new(SyncRwLock::new(HashMap::new()));

        let context = RuntimeContext {
            gates: gates.clone(),
            semaphores: semaphores.clone(),
            sequencers: sequencers.clone(),
            uses_sequencer: config.profile.uses_sequencer(),
            hooks: config.hooks.clone(),
            per_partition_inflight: effective_permits(config.max_inflight_per_partition),
            drain_timeout: config.partition_drain_timeout,
        };

        let consumer: StreamConsumer<RuntimeContext> = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("partition.assignment.strategy", "cooperative-sticky")
            .set("fetch.max.bytes", crate::topics::MIN_FETCH_MAX_BYTES.to_string())
            .set(
                "max.partition.fetch.bytes",
                crate::topics::MAX_MESSAGE_BYTES.to_string(),
            )
            .set("max.poll.interval.ms", "300000")
            .create_with_context(context)
            .map_err(BrokerError::Kafka)?;
        let consumer = Arc::new(consumer);

        let topic_refs: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topic_refs).map_err(BrokerError::Kafka)?;

        let pending = Arc::new(PendingOffsets::new(config.batch_commit_max_pending));
        let offset_client = Arc::new(KafkaOffsetClient {
            consumer: consumer.clone(),
            pending: pending.clone(),
        });

        let shutdown = CancellationToken::new();
        let batch_manager = BatchCommitManager::spawn(
            consumer.clone(),
            pending,
            config.batch_commit_interval,
            shutdown.clone(),
        );

        Ok(Self {
            consumer,
            gates,
            semaphores,
            sequencers,
            global_inflight: Arc::new(Semaphore::new(effective_permits(config.max_inflight_global))),
            offset_client,
            batch_manager,
            shutdown,
            config,
        })
    }

    /// Runs the poll/dispatch loop (§4.3 "Dispatch model") until
    /// `shutdown` is cancelled. `handler` is invoked per message with the
    /// decoded payload and must call `ack(success)` exactly once,
    /// typically via `InboundMessage::ack`.
    pub async fn run<F, Fut>(&self, shutdown: CancellationToken, handler: F)
    where
        F: Fn(InboundMessage<Vec<u8>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = self.consumer.recv() => {
                    match message {
                        Ok(borrowed) => {
                            metrics().messages_consumed.inc();
                            self.dispatch(borrowed, handler.clone()).await;
                        }
                        Err(err) => warn!(error = %err, "poll error"),
                    }
                }
            }
        }
    }

    async fn dispatch<F, Fut>(&self, message: BorrowedMessage<'_>, handler: Arc<F>)
    where
        F: Fn(InboundMessage<Vec<u8>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let topic = message.topic().to_string();
        let partition = message.partition();
        let offset = message.offset();
        let payload = message.payload().map(|b| b.to_vec()).unwrap_or_default();
        let broker_timestamp = message
            .timestamp()
            .to_millis()
            .and_then(|ms| chrono::DateTime::from_timestamp_millis(ms));

        let mut headers = HashMap::new();
        if let Some(rd_headers) = message.headers() {
            for header in rd_headers.iter() {
                if let Some(value) = header.value {
                    headers.insert(header.key.to_string(), value.to_vec());
                }
            }
        }

        let gate = self.gates.read().get(&(topic.clone(), partition)).cloned();
        let Some(gate) = gate else {
            warn!(topic, partition, offset, "no gate for partition, dropping");
            return;
        };
        gate.ensure_init(offset);

        let per_partition = self
            .semaphores
            .read()
            .get(&(topic.clone(), partition))
            .cloned();
        let Some(per_partition) = per_partition else {
            warn!(topic, partition, "no inflight semaphore for partition");
            return;
        };

        let global = self.global_inflight.clone();
        let offset_client = self.offset_client.clone();

        let global_permit = match global.acquire_owned().await {
            Ok(p) => p,
            Err(_) => return,
        };
        let partition_permit = match per_partition.acquire_owned().await {
            Ok(p) => p,
            Err(_) => return,
        };
        let global_capacity = effective_permits(self.config.max_inflight_global);
        metrics()
            .inflight_global
            .set((global_capacity - global.available_permits()) as u64);

        let ack_gate = gate.clone();
        let ack_topic = topic.clone();
        let permits = std::sync::Mutex::new(Some((global_permit, partition_permit)));
        let ack = AckHandle::new(move |success| {
            if success {
                ack_gate.mark_done(offset);
                metrics().gate_backlog.set(ack_gate.backlog() as u64);
                let gate_for_store = ack_gate.clone();
                let offset_client = offset_client.clone();
                tokio::spawn(async move {
                    if let Err(err) = gate_for_store.store_contiguous(&*offset_client).await {
                        warn!(error = %err, "store_contiguous failed");
                    }
                });
            } else {
                debug!(topic = %ack_topic, partition, offset, "handler reported failure, not advancing gate");
            }
            // Release both inflight permits; held in an `Option` behind a
            // mutex since the ack-once latch makes this run at most once
            // but the closure's `Fn` bound can't prove that to the borrow
            // checker.
            permits.lock().unwrap().take();
        });

        let inbound = InboundMessage::new(payload, topic.clone(), partition, offset, ack)
            .with_headers(headers)
            .with_broker_timestamp(broker_timestamp);

        let sequencer = self
            .sequencers
            .read()
            .get(&(topic, partition))
            .cloned();

        metrics().messages_dispatched.inc();
        match sequencer {
            Some(sequencer) => {
                tokio::spawn(async move {
                    sequencer
                        .push(
                            offset,
                            inbound,
                            |msg| msg.ack.ack(true),
                            move |msg| {
                                let handler = handler.clone();
                                async move { handler(msg).await }
                            },
                        )
                        .await;
                });
            }
            None => {
                tokio::spawn(async move {
                    handler(inbound).await;
                });
            }
        }
    }

    pub async fn close(self) {
        self.shutdown.cancel();
        let _ = self.batch_manager.await;
    }

    pub fn config(&self) -> &ConsumerRuntimeConfig {
        &self.config
    }
}
