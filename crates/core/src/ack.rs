//! Ack-once latch and the inbound message envelope handed to business logic.
//!
//! §3 "Inbound message", §9 "Ack-once semantics": the acknowledgement
//! callback must fire exactly once; later invocations are silent no-ops,
//! never errors.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// A one-shot latch wrapping a user-visible `ack(success)` callback.
///
/// Cloning an `AckHandle` shares the same latch: whichever clone calls
/// `ack` first wins, all others become no-ops. This lets the gate, the
/// sequencer, and the business handler each hold a handle without
/// coordinating who's "allowed" to acknowledge.
#[derive(Clone)]
pub struct AckHandle {
    fired: Arc<AtomicBool>,
    inner: Arc<dyn Fn(bool) + Send + Sync>,
}

impl AckHandle {
    /// Wraps `f` so it fires at most once across all clones of the handle.
    pub fn new(f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            inner: Arc::new(f),
        }
    }

    /// Acknowledges the message. Only the first call (across all clones)
    /// has any effect.
    pub fn ack(&self, success: bool) {
        if self
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            (self.inner)(success);
        }
    }

    /// Whether this handle (or a clone of it) has already been acknowledged.
    pub fn is_acked(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckHandle")
            .field("acked", &self.is_acked())
            .finish()
    }
}

/// A message handed from the consumer runtime to business logic.
///
/// `ack` must be invoked exactly once by the handler (enforced by
/// `AckHandle`'s latch, not by the caller's discipline).
#[derive(Debug, Clone)]
pub struct InboundMessage<T> {
    pub payload: T,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Headers carried alongside the message (§6): `schema`, `user_id`,
    /// `occurred`, plus any component-specific headers.
    pub headers: HashMap<String, Vec<u8>>,
    /// The broker-assigned message timestamp, when present — used as the
    /// fallback in `occurred_at` resolution (§4.6 step 2).
    pub broker_timestamp: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
    pub ack: AckHandle,
}

impl<T> InboundMessage<T> {
    pub fn new(
        payload: T,
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        ack: AckHandle,
    ) -> Self {
        Self {
            payload,
            topic: topic.into(),
            partition,
            offset,
            headers: HashMap::new(),
            broker_timestamp: None,
            observed_at: Utc::now(),
            ack,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, Vec<u8>>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_broker_timestamp(mut self, ts: Option<DateTime<Utc>>) -> Self {
        self.broker_timestamp = ts;
        self
    }

    pub fn header_str(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn ack_fires_exactly_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let last_value = Arc::new(AtomicBool::new(false));
        let calls2 = calls.clone();
        let last_value2 = last_value.clone();

        let handle = AckHandle::new(move |success| {
            calls2.fetch_add(1, Ordering::SeqCst);
            last_value2.store(success, Ordering::SeqCst);
        });

        handle.ack(true);
        handle.ack(false);
        handle.ack(true);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(last_value.load(Ordering::SeqCst));
        assert!(handle.is_acked());
    }

    #[test]
    fn clones_share_the_same_latch() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let handle = AckHandle::new(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        let cloned = handle.clone();

        handle.ack(true);
        cloned.ack(true);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cloned.is_acked());
    }
}
