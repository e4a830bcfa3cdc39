//! Primary-traffic producer (§6 "Broker client settings (producer)").
//!
//! Produces fetcher output into the primary log topic, keyed by the
//! per-user key so the stable partitioner preserves per-user ordering.
//! A delivery-report watcher forwards produce-delivery failures to the
//! DLQ as a last-resort dead letter (§4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pipeline_core::error::BrokerError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use tracing::warn;

use crate::dlq::{DlqEnvelope, DlqSink};

/// A message ready to be produced onto the primary log topic.
pub struct OutboundMessage {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub headers: HashMap<String, Vec<u8>>,
}

/// Primary-traffic producer: idempotent, `acks=all`, `lz4` compression,
/// 10ms linger, stable per-key partitioning (§6).
pub struct Producer {
    inner: FutureProducer,
    topic: String,
    send_timeout: Duration,
    dlq: Option<Arc<dyn DlqSink>>,
}

impl Producer {
    pub fn new(brokers: &str, topic: impl Into<String>) -> Result<Self, BrokerError> {
        let inner: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("compression.type", "lz4")
            .set("linger.ms", "10")
            .set("message.max.bytes", crate::topics::MAX_MESSAGE_BYTES.to_string())
            .set("message.send.max.retries", "10000000")
            .create()?;

        Ok(Self {
            inner,
            topic: topic.into(),
            send_timeout: Duration::from_secs(10),
            dlq: None,
        })
    }

    /// Installs a DLQ sink to receive produce-delivery failures
    /// ("failed-twice" captured as a last-resort dead letter, §4.5).
    pub fn with_dlq(mut self, dlq: Arc<dyn DlqSink>) -> Self {
        self.dlq = Some(dlq);
        self
    }

    pub async fn send(&self, message: OutboundMessage) -> Result<(), BrokerError> {
        let mut rd_headers = rdkafka::message::OwnedHeaders::new();
        for (k, v) in &message.headers {
            rd_headers = rd_headers.insert(rdkafka::message::Header {
                key: k.as_str(),
                value: Some(v),
            });
        }

        let record = FutureRecord::to(&self.topic)
            .key(&message.key)
            .payload(&message.value)
            .headers(rd_headers);

        let result = self.inner.send(record, self.send_timeout).await;

        if let Err((err, _owned)) = result {
            warn!(error = %err, topic = %self.topic, "primary produce failed, routing to DLQ");
            if let Some(dlq) = &self.dlq {
                let envelope = DlqEnvelope::new(
                    &self.topic,
                    -1,
                    -1,
                    format!("produce_failed:{err}"),
                    &message.value,
                );
                dlq.send_with_context(envelope, Some(message.key.clone()), message.headers)
                    .await?;
            }
            return Err(BrokerError::DlqSend(err.to_string()));
        }

        Ok(())
    }
}
