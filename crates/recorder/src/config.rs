//! Recorder configuration (§4.6).

use std::time::Duration;

/// Tunables for the recorder persistence core.
#[derive(Clone)]
pub struct RecorderConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Rows per `INSERT IGNORE` sub-batch (§4.6 step 5).
    pub sub_batch_size: usize,
    /// Per-record processing ceiling, independent of the outer context.
    pub record_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    /// Interval at which the DB pool idle-time reporter samples
    /// `{open, in-use, idle}` into telemetry gauges (§5).
    pub pool_report_interval: Duration,
}

impl RecorderConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            sub_batch_size: 300,
            record_timeout: Duration::from_secs(5),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
            pool_report_interval: Duration::from_secs(10),
        }
    }

    pub fn with_sub_batch_size(mut self, n: usize) -> Self {
        self.sub_batch_size = n;
        self
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn with_retry_attempts(mut self, n: u32) -> Self {
        self.retry_attempts = n;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = RecorderConfig::new("mysql://localhost/pipeline");
        assert_eq!(cfg.sub_batch_size, 300);
        assert_eq!(cfg.retry_attempts, 3);
        assert_eq!(cfg.record_timeout, Duration::from_secs(5));
    }
}
