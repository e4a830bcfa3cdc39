//! Mock implementations for testing.

use async_trait::async_trait;
use broker::dlq::{DlqEnvelope, DlqSink};
use pipeline_core::error::BrokerError;
use std::collections::HashMap;
use std::sync::Arc;

/// Mock DLQ sink that captures envelopes in memory instead of producing
/// to a real broker.
///
/// Implements the same `DlqSink` trait as the real `DlqProducer`, so the
/// recorder pipeline under test exercises the same code paths up to the
/// point of actually talking to Kafka.
#[derive(Clone, Default)]
pub struct MockDlqSink {
    sent: Arc<parking_lot::Mutex<Vec<DlqEnvelope>>>,
    should_fail: Arc<parking_lot::Mutex<bool>>,
}

impl MockDlqSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured(&self) -> Vec<DlqEnvelope> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }
}

#[async_trait]
impl DlqSink for MockDlqSink {
    async fn send_with_context(
        &self,
        envelope: DlqEnvelope,
        _key: Option<Vec<u8>>,
        _headers: HashMap<String, Vec<u8>>,
    ) -> Result<(), BrokerError> {
        if *self.should_fail.lock() {
            return Err(BrokerError::DlqSend("mock dlq failure".to_string()));
        }
        self.sent.lock().push(envelope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_sink_captures_envelopes() {
        let sink = MockDlqSink::new();
        let envelope = DlqEnvelope::new("t", 0, 1, "reason", b"{}");
        sink.send_with_context(envelope, None, HashMap::new())
            .await
            .unwrap();
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn mock_sink_fails_on_demand() {
        let sink = MockDlqSink::new();
        sink.set_should_fail(true);
        let envelope = DlqEnvelope::new("t", 0, 1, "reason", b"{}");
        let result = sink
            .send_with_context(envelope, None, HashMap::new())
            .await;
        assert!(result.is_err());
    }
}
