//! Leader-elected cursor fetcher binary (§4.1).
//!
//! Acquires single-writer leadership over the shared cursor and runs a
//! caller-supplied callback for as long as the lease is held. What the
//! callback actually fetches from is outside this crate's scope (the
//! spec explicitly excludes third-party API clients); here it
//! demonstrates the wiring by reading back the current cursor value on
//! every cycle.

use std::time::Duration;

use anyhow::{Context, Result};
use cursor_store::{CursorStore, CursorStoreConfig, Fetcher};
use telemetry::{health, init_tracing_from_env};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_redis_url")]
    redis_url: String,
    #[serde(default = "default_key_prefix")]
    key_prefix: String,
    app_id: Option<String>,
    #[serde(default = "default_lease_ttl_ms")]
    lease_ttl_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    "pipeline".to_string()
}

fn default_lease_ttl_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    800
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
            app_id: None,
            lease_ttl_ms: default_lease_ttl_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing_from_env();

    info!("starting cursor fetcher v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    let store_config = CursorStoreConfig {
        redis_url: config.redis_url.clone(),
        key_prefix: config.key_prefix.clone(),
        app_id: config.app_id.clone(),
        lease_ttl_ms: config.lease_ttl_ms,
        poll_interval_ms: config.poll_interval_ms,
        ..CursorStoreConfig::default()
    };

    let store = CursorStore::connect(store_config)
        .await
        .context("failed to connect cursor store")?;
    health().cursor_store.set_healthy();

    let fetcher = Fetcher::new(store);
    let shutdown = CancellationToken::new();

    let run_shutdown = shutdown.clone();
    let run_handle = tokio::spawn(async move {
        fetcher
            .run(run_shutdown, |ctx| async move {
                info!(epoch = ctx.epoch, "fetch cycle started");
                // Business-specific fetch/publish logic plugs in here.
                tokio::select! {
                    _ = ctx.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            })
            .await;
    });

    shutdown_signal().await;
    info!("shutdown signal received, stopping fetcher");
    shutdown.cancel();

    if let Err(err) = run_handle.await {
        warn!(error = %err, "fetcher task join error");
    }

    Ok(())
}

fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/fetcher")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("PIPELINE")
                .try_parsing(true),
        )
        .build()
        .context("failed to build fetcher configuration")?;

    config
        .try_deserialize()
        .context("failed to deserialize fetcher configuration")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl+c"),
        _ = terminate => info!("received terminate signal"),
    }
}
