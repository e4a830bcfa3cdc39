//! Internal metrics collection.
//!
//! Collects counters, gauges, and latency histograms in-memory for the
//! fetcher, gate, consumer runtime, sequencer, DLQ, and recorder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the messaging pipeline (§13).
#[derive(Debug, Default)]
pub struct Metrics {
    // Cursor store / fetcher (§4.1)
    pub leadership_acquired: Counter,
    pub leadership_lost: Counter,
    pub cas_conflicts: Counter,
    pub cas_retries: Counter,
    pub fetcher_cycles: Counter,

    // Partition commit gate (§4.2)
    pub gate_backlog: Gauge,
    pub offsets_stored: Counter,
    pub offsets_committed: Counter,

    // Consumer runtime (§4.3)
    pub messages_consumed: Counter,
    pub messages_dispatched: Counter,
    pub inflight_global: Gauge,
    pub partitions_assigned: Gauge,
    pub rebalance_events: Counter,

    // Partition sequencer (§4.4)
    pub sequencer_buffered: Gauge,
    pub sequencer_late_duplicates: Counter,

    // DLQ pipeline (§4.5)
    pub dlq_sends: Counter,
    pub dlq_send_failures: Counter,

    // Recorder persistence core (§4.6)
    pub rows_inserted: Counter,
    pub rows_ignored: Counter,
    pub recorder_retries: Counter,
    pub recorder_retry_exhausted: Counter,
    pub recorder_db_pool_open: Gauge,
    pub recorder_db_pool_in_use: Gauge,
    pub recorder_db_pool_idle: Gauge,

    // Latency histograms
    pub gate_store_latency_ms: Histogram,
    pub dispatch_latency_ms: Histogram,
    pub recorder_insert_latency_ms: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub leadership_acquired: u64,
    pub leadership_lost: u64,
    pub cas_conflicts: u64,
    pub gate_backlog: u64,
    pub offsets_stored: u64,
    pub offsets_committed: u64,
    pub messages_consumed: u64,
    pub messages_dispatched: u64,
    pub inflight_global: u64,
    pub partitions_assigned: u64,
    pub dlq_sends: u64,
    pub dlq_send_failures: u64,
    pub rows_inserted: u64,
    pub rows_ignored: u64,
    pub recorder_retries: u64,
    pub recorder_retry_exhausted: u64,
    pub recorder_insert_latency_mean_ms: f64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            leadership_acquired: self.leadership_acquired.get(),
            leadership_lost: self.leadership_lost.get(),
            cas_conflicts: self.cas_conflicts.get(),
            gate_backlog: self.gate_backlog.get(),
            offsets_stored: self.offsets_stored.get(),
            offsets_committed: self.offsets_committed.get(),
            messages_consumed: self.messages_consumed.get(),
            messages_dispatched: self.messages_dispatched.get(),
            inflight_global: self.inflight_global.get(),
            partitions_assigned: self.partitions_assigned.get(),
            dlq_sends: self.dlq_sends.get(),
            dlq_send_failures: self.dlq_send_failures.get(),
            rows_inserted: self.rows_inserted.get(),
            rows_ignored: self.rows_ignored.get(),
            recorder_retries: self.recorder_retries.get(),
            recorder_retry_exhausted: self.recorder_retry_exhausted.get(),
            recorder_insert_latency_mean_ms: self.recorder_insert_latency_ms.mean(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
