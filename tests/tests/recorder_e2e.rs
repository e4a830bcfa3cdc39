//! End-to-end tests for the recorder persistence pipeline (§4.6).
//!
//! Exercises `process_record` against a real MySQL container: a Q/A
//! payload goes in, conversation rows come out, and a duplicate delivery
//! is silently absorbed by `INSERT IGNORE`.
//!
//! Requires Docker to be running for the MySQL testcontainer.

use integration_tests::{fixtures, setup::TestContext};

#[tokio::test]
async fn happy_path_expands_and_inserts_rows() {
    let ctx = TestContext::new().await;
    ctx.truncate().await;

    let user_id = fixtures::test_user_id();
    let payload = fixtures::qa_payload(&[("what's my balance?", "your balance is $42")]);
    let (message, acked) = fixtures::inbound_message("chat.qa.v1", &user_id, payload);

    let dlq: std::sync::Arc<dyn broker::dlq::DlqSink> = ctx.dlq.clone();
    recorder::process_record(
        message,
        ctx.recorder_client.pool(),
        &ctx.recorder_config,
        &dlq,
    )
    .await;

    assert!(acked.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(ctx.conversation_count(&user_id).await, 2);
    assert_eq!(ctx.dlq.count(), 0);
}

#[tokio::test]
async fn duplicate_delivery_is_idempotent() {
    let ctx = TestContext::new().await;
    ctx.truncate().await;

    let user_id = fixtures::test_user_id();
    let payload = fixtures::qa_payload(&[("hello", "hi there")]);
    let occurred = chrono::Utc::now().timestamp();

    for _ in 0..2 {
        let (message, _acked) = fixtures::inbound_message_at(
            "chat.qa.v1",
            &user_id,
            payload.clone(),
            occurred,
        );
        let dlq: std::sync::Arc<dyn broker::dlq::DlqSink> = ctx.dlq.clone();
        recorder::process_record(
            message,
            ctx.recorder_client.pool(),
            &ctx.recorder_config,
            &dlq,
        )
        .await;
    }

    // Same `(user_id, source, content, occurred_at)` tuple both times;
    // the second delivery's rows collide with `INSERT IGNORE`.
    assert_eq!(ctx.conversation_count(&user_id).await, 2);
}

#[tokio::test]
async fn empty_qa_array_is_acked_without_rows() {
    let ctx = TestContext::new().await;
    ctx.truncate().await;

    let user_id = fixtures::test_user_id();
    let payload = fixtures::qa_payload(&[]);
    let (message, acked) = fixtures::inbound_message("chat.qa.v1", &user_id, payload);

    let dlq: std::sync::Arc<dyn broker::dlq::DlqSink> = ctx.dlq.clone();
    recorder::process_record(
        message,
        ctx.recorder_client.pool(),
        &ctx.recorder_config,
        &dlq,
    )
    .await;

    assert!(acked.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(ctx.conversation_count(&user_id).await, 0);
}

#[tokio::test]
async fn blank_fields_are_skipped_but_non_blank_ones_recorded() {
    let ctx = TestContext::new().await;
    ctx.truncate().await;

    let user_id = fixtures::test_user_id();
    let payload = fixtures::qa_payload(&[("only a question", "")]);
    let (message, acked) = fixtures::inbound_message("chat.qa.v1", &user_id, payload);

    let dlq: std::sync::Arc<dyn broker::dlq::DlqSink> = ctx.dlq.clone();
    recorder::process_record(
        message,
        ctx.recorder_client.pool(),
        &ctx.recorder_config,
        &dlq,
    )
    .await;

    assert!(acked.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(ctx.conversation_count(&user_id).await, 1);
}
