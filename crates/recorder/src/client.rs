//! MySQL pool wrapper and idle-time reporter (§5 "DB pool is shared; an
//! idle-time reporter periodically samples `{open, in-use, idle}`").
//!
//! Grounded on `ClickHouseClient`'s connection-wrapper shape and on
//! `Producer::start_flush_task`'s periodic-task idiom.

use std::sync::Arc;
use std::time::Duration;

use pipeline_core::error::RecorderError;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use telemetry::metrics;
use tracing::info;

use crate::config::RecorderConfig;

/// MySQL pool wrapper for the recorder persistence core.
#[derive(Clone)]
pub struct RecorderClient {
    pool: MySqlPool,
}

impl RecorderClient {
    pub async fn connect(config: &RecorderConfig) -> Result<Self, RecorderError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "recorder connected to MySQL"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Starts the background task sampling pool occupancy into telemetry
    /// gauges at `config.pool_report_interval`. `sqlx::Pool` doesn't expose
    /// wait-count/wait-duration, so only `{open, in-use, idle}` are sampled.
    pub fn start_pool_reporter(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let client = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                let size = client.pool.size();
                let idle = client.pool.num_idle();
                let in_use = size as usize - idle;

                metrics().recorder_db_pool_open.set(size as u64);
                metrics().recorder_db_pool_idle.set(idle as u64);
                metrics().recorder_db_pool_in_use.set(in_use as u64);
            }
        })
    }
}
