//! Shared types for the messaging-pipeline core: the error taxonomy (§7),
//! the ack-once inbound message envelope (§3, §9), lifecycle hooks (§6,
//! §9), and timestamp normalization (§4.6, §9).

pub mod ack;
pub mod error;
pub mod hooks;
pub mod timezone;

pub use ack::{AckHandle, InboundMessage};
pub use error::{
    classify_db_error, BrokerError, CursorError, Error, GateError, RecorderError, Result,
    RetryClass,
};
pub use hooks::LifecycleHooks;
pub use timezone::{fallback_offset, resolve_occurred_at, to_pipeline_zone, PIPELINE_TZ};
