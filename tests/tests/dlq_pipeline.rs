//! Dead-letter routing tests (§4.5, §4.6 steps 1-3).
//!
//! Each malformed-record case must be acked (so the broker advances past
//! it) and routed to the DLQ sink rather than causing a retry loop.
//!
//! Requires Docker to be running for the MySQL testcontainer.

use std::collections::HashMap;
use std::sync::Arc;

use broker::dlq::DlqSink;
use chrono::Utc;
use pipeline_core::ack::{AckHandle, InboundMessage};
use integration_tests::{fixtures, setup::TestContext};

fn message_with_headers(
    payload: Vec<u8>,
    headers: HashMap<String, Vec<u8>>,
) -> (InboundMessage<Vec<u8>>, Arc<std::sync::atomic::AtomicBool>) {
    let acked = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let acked2 = acked.clone();
    let ack = AckHandle::new(move |success| {
        acked2.store(success, std::sync::atomic::Ordering::SeqCst);
    });
    let message = InboundMessage::new(payload, "chat.qa.v1", 0, 0, ack)
        .with_headers(headers)
        .with_broker_timestamp(Some(Utc::now()));
    (message, acked)
}

#[tokio::test]
async fn invalid_schema_header_goes_to_dlq() {
    let ctx = TestContext::new().await;

    let mut headers = HashMap::new();
    headers.insert("schema".to_string(), b"wrong.schema.v9".to_vec());
    headers.insert("user_id".to_string(), b"user-1".to_vec());
    let (message, acked) = message_with_headers(b"[]".to_vec(), headers);

    let dlq: Arc<dyn DlqSink> = ctx.dlq.clone();
    recorder::process_record(message, ctx.recorder_client.pool(), &ctx.recorder_config, &dlq)
        .await;

    assert!(acked.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(ctx.dlq.count(), 1);
    assert!(ctx.dlq.captured()[0].reason.starts_with("invalid_schema"));
}

#[tokio::test]
async fn missing_user_id_header_goes_to_dlq() {
    let ctx = TestContext::new().await;

    let mut headers = HashMap::new();
    headers.insert("schema".to_string(), b"ipang.qa.v1".to_vec());
    let (message, acked) = message_with_headers(b"[]".to_vec(), headers);

    let dlq: Arc<dyn DlqSink> = ctx.dlq.clone();
    recorder::process_record(message, ctx.recorder_client.pool(), &ctx.recorder_config, &dlq)
        .await;

    assert!(acked.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(ctx.dlq.count(), 1);
    assert_eq!(ctx.dlq.captured()[0].reason, "missing_user_id");
}

#[tokio::test]
async fn malformed_json_payload_goes_to_dlq() {
    let ctx = TestContext::new().await;

    let user_id = fixtures::test_user_id();
    let (message, acked) =
        fixtures::inbound_message("chat.qa.v1", &user_id, b"not valid json".to_vec());

    let dlq: Arc<dyn DlqSink> = ctx.dlq.clone();
    recorder::process_record(message, ctx.recorder_client.pool(), &ctx.recorder_config, &dlq)
        .await;

    assert!(acked.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(ctx.dlq.count(), 1);
    assert!(ctx.dlq.captured()[0]
        .reason
        .starts_with("json_unmarshal_failed"));
}
