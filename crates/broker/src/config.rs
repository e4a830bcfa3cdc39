//! Consumer runtime configuration (§4.3).

use std::time::Duration;

use pipeline_core::hooks::LifecycleHooks;

/// Which business profile a consumer runtime is wired for — resolves the
/// spec's Open Question on profile selection with an explicit enum rather
/// than a stringly-typed config key, so a caller can't typo a profile name
/// and silently get default behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerProfile {
    /// Chat-facing consumer: sequencer enabled, moderate inflight bounds.
    Chat,
    /// Recorder-facing consumer: no sequencer (the recorder tolerates
    /// out-of-partition-order inserts), higher inflight bounds to keep the
    /// MySQL batch pipeline fed.
    Recorder,
}

impl ConsumerProfile {
    pub fn uses_sequencer(&self) -> bool {
        matches!(self, ConsumerProfile::Chat)
    }

    pub fn default_max_inflight_per_partition(&self) -> usize {
        match self {
            ConsumerProfile::Chat => 32,
            ConsumerProfile::Recorder => 128,
        }
    }

    pub fn default_max_inflight_global(&self) -> usize {
        match self {
            ConsumerProfile::Chat => 256,
            ConsumerProfile::Recorder => 1024,
        }
    }
}

/// Tunables for the consumer runtime (§4.3).
#[derive(Clone)]
pub struct ConsumerRuntimeConfig {
    pub profile: ConsumerProfile,
    pub brokers: String,
    pub group_id: String,
    pub topics: Vec<String>,
    pub max_inflight_per_partition: usize,
    pub max_inflight_global: usize,
    pub batch_commit_interval: Duration,
    pub batch_commit_max_pending: usize,
    pub partition_drain_timeout: Duration,
    pub hooks: LifecycleHooks,
}

impl ConsumerRuntimeConfig {
    pub fn new(
        profile: ConsumerProfile,
        brokers: impl Into<String>,
        group_id: impl Into<String>,
        topics: Vec<String>,
    ) -> Self {
        Self {
            max_inflight_per_partition: profile.default_max_inflight_per_partition(),
            max_inflight_global: profile.default_max_inflight_global(),
            profile,
            brokers: brokers.into(),
            group_id: group_id.into(),
            topics,
            batch_commit_interval: Duration::from_secs(5),
            batch_commit_max_pending: 100,
            partition_drain_timeout: Duration::from_secs(30),
            hooks: LifecycleHooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_max_inflight_per_partition(mut self, n: usize) -> Self {
        self.max_inflight_per_partition = n;
        self
    }

    pub fn with_max_inflight_global(mut self, n: usize) -> Self {
        self.max_inflight_global = n;
        self
    }

    pub fn with_batch_commit_interval(mut self, d: Duration) -> Self {
        self.batch_commit_interval = d;
        self
    }

    pub fn with_batch_commit_max_pending(mut self, n: usize) -> Self {
        self.batch_commit_max_pending = n;
        self
    }

    pub fn with_partition_drain_timeout(mut self, d: Duration) -> Self {
        self.partition_drain_timeout = d;
        self
    }
}
