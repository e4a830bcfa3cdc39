//! Per-record recorder pipeline (§4.6).

use std::sync::Arc;
use std::time::Duration;

use broker::dlq::{DlqEnvelope, DlqSink};
use pipeline_core::ack::InboundMessage;
use pipeline_core::error::{classify_db_error, RecorderError, RetryClass};
use pipeline_core::timezone::resolve_occurred_at;
use rand::Rng;
use telemetry::metrics;
use tracing::{debug, warn};

use crate::config::RecorderConfig;
use crate::insert::insert_rows;
use crate::model::{expand_rows, QaPair};

const SCHEMA_TAG: &str = "ipang.qa.v1";

/// Processes one inbound record end to end: validate, resolve timestamp,
/// deserialize, expand to rows, insert with classified retry, and ack.
///
/// Ack is called *before* emitting success metrics, but only after the DB
/// write has durably succeeded (§4.6 "Commit ordering").
pub async fn process_record(
    message: InboundMessage<Vec<u8>>,
    pool: &sqlx::MySqlPool,
    config: &RecorderConfig,
    dlq: &Arc<dyn DlqSink>,
) {
    let result = tokio::time::timeout(
        config.record_timeout,
        process_record_inner(&message, pool, config, dlq),
    )
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(error = %err, "recorder pipeline failed, message not acked");
            message.ack.ack(false);
        }
        Err(_) => {
            warn!("recorder per-record processing ceiling exceeded");
            message.ack.ack(false);
        }
    }
}

async fn process_record_inner(
    message: &InboundMessage<Vec<u8>>,
    pool: &sqlx::MySqlPool,
    config: &RecorderConfig,
    dlq: &Arc<dyn DlqSink>,
) -> Result<(), RecorderError> {
    let schema = message.header_str("schema");
    if schema != Some(SCHEMA_TAG) {
        send_to_dlq(
            message,
            dlq,
            format!("invalid_schema:{:?}", schema.map(str::to_string)),
        )
        .await;
        message.ack.ack(true);
        return Ok(());
    }

    let Some(user_id) = message.header_str("user_id").map(str::to_string) else {
        send_to_dlq(message, dlq, "missing_user_id").await;
        message.ack.ack(true);
        return Ok(());
    };

    let occurred_header = message
        .header_str("occurred")
        .and_then(|v| v.parse::<i64>().ok());
    let occurred_at = resolve_occurred_at(occurred_header, message.broker_timestamp);

    let pairs: Vec<QaPair> = match serde_json::from_slice(&message.payload) {
        Ok(pairs) => pairs,
        Err(err) => {
            send_to_dlq(message, dlq, format!("json_unmarshal_failed:{err}")).await;
            message.ack.ack(true);
            return Ok(());
        }
    };

    let rows = expand_rows(&user_id, &pairs, occurred_at);
    if rows.is_empty() {
        message.ack.ack(true);
        return Ok(());
    }

    match insert_with_retry(pool, &rows, config).await {
        Ok(outcome) => {
            message.ack.ack(true);
            metrics().rows_inserted.inc_by(outcome.inserted);
            metrics().rows_ignored.inc_by(outcome.ignored);
            debug!(
                user_id = %user_id,
                inserted = outcome.inserted,
                ignored = outcome.ignored,
                "conversation rows recorded"
            );
        }
        Err(err) => {
            send_to_dlq(message, dlq, format!("mysql_write_failed:{err}")).await;
            message.ack.ack(true);
        }
    }

    Ok(())
}

async fn insert_with_retry(
    pool: &sqlx::MySqlPool,
    rows: &[crate::model::ConversationRow],
    config: &RecorderConfig,
) -> Result<crate::insert::InsertOutcome, RecorderError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match insert_rows(pool, rows, config.sub_batch_size).await {
            Ok(outcome) => return Ok(outcome),
            Err(RecorderError::Database(db_err)) => {
                let class = classify_db_error(&db_err);
                if class.is_retryable() && attempt < config.retry_attempts {
                    let delay = backoff_with_jitter(attempt, config.retry_base_delay);
                    metrics().recorder_retries.inc();
                    warn!(
                        attempt,
                        class = ?class,
                        delay_ms = delay.as_millis() as u64,
                        "retrying recorder insert"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                if matches!(class, RetryClass::Other) {
                    return Err(RecorderError::Database(db_err));
                }
                metrics().recorder_retry_exhausted.inc();
                return Err(RecorderError::RetryExhausted {
                    attempts: attempt,
                    source: db_err,
                });
            }
            Err(other) => return Err(other),
        }
    }
}

/// `100 · 2^(attempt-1)` ms with ±20% jitter (§4.6 "Retry policy").
fn backoff_with_jitter(attempt: u32, base: Duration) -> Duration {
    let base_ms = base.as_millis() as u64 * 2u64.pow(attempt.saturating_sub(1));
    let jitter_range = (base_ms as f64 * 0.2) as i64;
    let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
    let delay_ms = (base_ms as i64 + jitter).max(0) as u64;
    Duration::from_millis(delay_ms)
}

async fn send_to_dlq(
    message: &InboundMessage<Vec<u8>>,
    dlq: &Arc<dyn DlqSink>,
    reason: impl Into<String>,
) {
    let envelope = DlqEnvelope::new(
        &message.topic,
        message.partition,
        message.offset,
        reason,
        &message.payload,
    );
    if let Err(err) = dlq
        .send_with_context(envelope, None, message.headers.clone())
        .await
    {
        warn!(error = %err, "dlq send failed for recorder record");
        metrics().dlq_send_failures.inc();
    } else {
        metrics().dlq_sends.inc();
    }
}
