//! Consumer runtime binary (§4.3, §4.6): wires the cooperative-sticky
//! broker consumer to the recorder persistence pipeline.
//!
//! The chat-facing profile (sequencer-backed, in-order delivery to a
//! business handler) is the same runtime under a different
//! `ConsumerProfile`; this binary wires the recorder profile, the one
//! with a concrete, fully specified handler in this repo's scope.

use std::sync::Arc;

use anyhow::{Context, Result};
use broker::{ConsumerProfile, ConsumerRuntime, ConsumerRuntimeConfig, DlqProducer, DlqSink};
use recorder::{RecorderClient, RecorderConfig};
use telemetry::{health, init_tracing_from_env};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_brokers")]
    brokers: String,
    #[serde(default = "default_group_id")]
    group_id: String,
    #[serde(default = "default_topics")]
    topics: Vec<String>,
    #[serde(default = "default_dlq_topic")]
    dlq_topic: String,
    database_url: String,
}

fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_group_id() -> String {
    "recorder".to_string()
}

fn default_topics() -> Vec<String> {
    vec!["chat.qa.v1".to_string()]
}

fn default_dlq_topic() -> String {
    "chat.qa.dlq.v1".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            group_id: default_group_id(),
            topics: default_topics(),
            dlq_topic: default_dlq_topic(),
            database_url: String::new(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing_from_env();

    info!("starting recorder consumer v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    let recorder_config = RecorderConfig::new(config.database_url.clone());
    let recorder_client = RecorderClient::connect(&recorder_config)
        .await
        .context("failed to connect recorder database")?;
    health().recorder_db.set_healthy();

    let recorder_client = Arc::new(recorder_client);
    let _pool_reporter = recorder_client
        .clone()
        .start_pool_reporter(recorder_config.pool_report_interval);

    let dlq: Arc<dyn DlqSink> = Arc::new(
        DlqProducer::new(&config.brokers, config.dlq_topic.clone())
            .context("failed to construct dlq producer")?,
    );

    let runtime_config = ConsumerRuntimeConfig::new(
        ConsumerProfile::Recorder,
        config.brokers.clone(),
        config.group_id.clone(),
        config.topics.clone(),
    );
    let runtime =
        Arc::new(ConsumerRuntime::new(runtime_config).context("failed to start consumer runtime")?);
    health().broker.set_healthy();

    let shutdown = CancellationToken::new();
    let run_shutdown = shutdown.clone();
    let run_runtime = runtime.clone();

    let run_handle = tokio::spawn(async move {
        let pool = recorder_client.pool().clone();
        run_runtime
            .run(run_shutdown, move |message| {
                let pool = pool.clone();
                let dlq = dlq.clone();
                let recorder_config = recorder_config.clone();
                async move {
                    recorder::process_record(message, &pool, &recorder_config, &dlq).await;
                }
            })
            .await;
    });

    shutdown_signal().await;
    info!("shutdown signal received, stopping consumer");
    shutdown.cancel();

    if let Err(err) = run_handle.await {
        warn!(error = %err, "consumer task join error");
    }

    if let Ok(rt) = Arc::try_unwrap(runtime) {
        rt.close().await;
    }

    Ok(())
}

fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/consumer")
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
        .context("failed to build consumer configuration")?;

    config
        .try_deserialize()
        .context("failed to deserialize consumer configuration")
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
