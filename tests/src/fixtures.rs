//! Test fixtures: Q/A payload generators and inbound-message builders.

use std::collections::HashMap;

use chrono::Utc;
use pipeline_core::ack::{AckHandle, InboundMessage};
use uuid::Uuid;

/// Generate a Q/A payload JSON array with `n` pairs.
pub fn qa_payload(pairs: &[(&str, &str)]) -> Vec<u8> {
    let value: Vec<serde_json::Value> = pairs
        .iter()
        .map(|(q, a)| serde_json::json!({ "Q": q, "A": a }))
        .collect();
    serde_json::to_vec(&value).unwrap()
}

/// A fresh, random user id for isolating rows between test runs.
pub fn test_user_id() -> String {
    format!("user-{}", Uuid::new_v4())
}

/// Build an `InboundMessage` carrying a valid schema/user_id header pair
/// and the given JSON payload, with an `AckHandle` whose final value is
/// observable via the returned flag. The `occurred` header is fixed to
/// the moment of construction so repeated deliveries of the same
/// payload resolve to the same `occurred_at`, letting dedup tests work.
pub fn inbound_message(
    topic: &str,
    user_id: &str,
    payload: Vec<u8>,
) -> (InboundMessage<Vec<u8>>, std::sync::Arc<std::sync::atomic::AtomicBool>) {
    inbound_message_at(topic, user_id, payload, Utc::now().timestamp())
}

/// Same as [`inbound_message`], but with an explicit `occurred` header
/// value (Unix seconds) so callers can pin the resolved `occurred_at`
/// across calls.
pub fn inbound_message_at(
    topic: &str,
    user_id: &str,
    payload: Vec<u8>,
    occurred_secs: i64,
) -> (InboundMessage<Vec<u8>>, std::sync::Arc<std::sync::atomic::AtomicBool>) {
    let acked = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let acked2 = acked.clone();
    let ack = AckHandle::new(move |success| {
        acked2.store(success, std::sync::atomic::Ordering::SeqCst);
    });

    let mut headers = HashMap::new();
    headers.insert("schema".to_string(), b"ipang.qa.v1".to_vec());
    headers.insert("user_id".to_string(), user_id.as_bytes().to_vec());
    headers.insert("occurred".to_string(), occurred_secs.to_string().into_bytes());

    let message = InboundMessage::new(payload, topic, 0, 0, ack)
        .with_headers(headers)
        .with_broker_timestamp(Some(Utc::now()));

    (message, acked)
}
