//! Unified error taxonomy for the messaging pipeline.
//!
//! Errors are grouped by the component that raises them rather than left as
//! one flat enum, so call sites match on the *kind* of failure (per-module)
//! instead of string content.

use thiserror::Error;

/// Result type alias using our top-level Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for the messaging pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Cursor store / fetcher failures (§4.1, §7 kind 1-3).
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("leadership lost: lease no longer held at epoch {epoch}")]
    LeadershipLost { epoch: u64 },

    #[error("cas conflict: expected version {expected}, cursor was at a different version")]
    CasConflict { expected: u64 },

    #[error("redis transient failure after {attempts} attempts: {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: redis::RedisError,
    },

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("shadow file io error: {0}")]
    ShadowIo(#[from] std::io::Error),

    #[error("shadow file corrupt: {0}")]
    ShadowCorrupt(String),
}

/// Partition commit gate failures (§4.2).
#[derive(Debug, Error)]
pub enum GateError {
    #[error("no gate registered for partition {0}")]
    NoGate(i32),

    #[error("offset store failed: {0}")]
    StoreFailed(String),

    #[error("offset commit failed: {0}")]
    CommitFailed(String),
}

/// Consumer runtime / DLQ / sequencer failures (§4.3-§4.5, §7 kind 4,6,7).
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("kafka client error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("message decode error: {0}")]
    Decode(String),

    #[error("dlq send failed: {0}")]
    DlqSend(String),

    #[error("partition drain timed out after {0:?}")]
    DrainTimeout(std::time::Duration),

    #[error("fatal startup error: {0}")]
    FatalStartup(String),
}

/// Recorder persistence failures, pre-classification (§4.6, §7 kind 5).
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("invalid schema header: expected \"ipang.qa.v1\", got {0:?}")]
    InvalidSchema(Option<String>),

    #[error("missing user_id header")]
    MissingUserId,

    #[error("json decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("retry budget exhausted after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
}

/// Tagged classification of a recorder database error, per §4.6 / §9.
///
/// Produced by a classifier function rather than matched ad hoc at call
/// sites — see `RecorderError::classify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Deadlock,
    Timeout,
    BadConnection,
    Other,
}

impl RetryClass {
    /// Whether this classification warrants a retry.
    pub fn is_retryable(self) -> bool {
        !matches!(self, RetryClass::Other)
    }
}

/// MySQL deadlock error code (ER_LOCK_DEADLOCK).
const MYSQL_DEADLOCK_CODE: &str = "1213";
/// MySQL lock wait timeout exceeded (ER_LOCK_WAIT_TIMEOUT).
const MYSQL_LOCK_WAIT_TIMEOUT_CODE: &str = "1205";
/// MySQL server gone away.
const MYSQL_SERVER_GONE_CODE: &str = "2006";
/// MySQL lost connection during query.
const MYSQL_CONNECTION_LOST_CODE: &str = "2013";

/// Classifies a `sqlx::Error` into a retry-relevant tag, per §4.6's retry
/// policy. Prefer this over string-matching at call sites.
pub fn classify_db_error(err: &sqlx::Error) -> RetryClass {
    if let sqlx::Error::Database(db_err) = err {
        let message = db_err.message().to_ascii_lowercase();
        if message.contains("deadlock") {
            return RetryClass::Deadlock;
        }
        if let Some(code) = db_err.code() {
            let code = code.as_ref();
            if code == MYSQL_DEADLOCK_CODE {
                return RetryClass::Deadlock;
            }
            if code == MYSQL_LOCK_WAIT_TIMEOUT_CODE
                || code == MYSQL_SERVER_GONE_CODE
                || code == MYSQL_CONNECTION_LOST_CODE
            {
                return RetryClass::Timeout;
            }
        }
        if message.contains("timeout")
            || message.contains("connection refused")
            || message.contains("connection reset")
        {
            return RetryClass::Timeout;
        }
        return RetryClass::Other;
    }

    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => RetryClass::Timeout,
        sqlx::Error::PoolClosed => RetryClass::BadConnection,
        _ => {
            let text = err.to_string().to_ascii_lowercase();
            if text.contains("deadlock") {
                RetryClass::Deadlock
            } else if text.contains("timeout")
                || text.contains("connection refused")
                || text.contains("connection reset")
                || text.contains("bad connection")
            {
                RetryClass::Timeout
            } else {
                RetryClass::Other
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_error(code: &'static str, message: &'static str) -> sqlx::Error {
        use std::borrow::Cow;

        #[derive(Debug)]
        struct FakeDbError {
            code: &'static str,
            message: &'static str,
        }

        impl std::fmt::Display for FakeDbError {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.message)
            }
        }

        impl std::error::Error for FakeDbError {}

        impl sqlx::error::DatabaseError for FakeDbError {
            fn message(&self) -> &str {
                self.message
            }

            fn code(&self) -> Option<Cow<'_, str>> {
                Some(Cow::Borrowed(self.code))
            }

            fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
                self
            }

            fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
                self
            }

            fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
                self
            }

            fn kind(&self) -> sqlx::error::ErrorKind {
                sqlx::error::ErrorKind::Other
            }
        }

        sqlx::Error::Database(Box::new(FakeDbError { code, message }))
    }

    #[test]
    fn classifies_deadlock_by_code() {
        let err = db_error(MYSQL_DEADLOCK_CODE, "Deadlock found when trying to get lock");
        assert_eq!(classify_db_error(&err), RetryClass::Deadlock);
    }

    #[test]
    fn classifies_deadlock_by_message_regardless_of_code() {
        let err = db_error("9999", "DEADLOCK detected, retry transaction");
        assert_eq!(classify_db_error(&err), RetryClass::Deadlock);
    }

    #[test]
    fn classifies_lock_wait_timeout_as_timeout() {
        let err = db_error(MYSQL_LOCK_WAIT_TIMEOUT_CODE, "Lock wait timeout exceeded");
        assert_eq!(classify_db_error(&err), RetryClass::Timeout);
    }

    #[test]
    fn classifies_server_gone_as_timeout() {
        let err = db_error(MYSQL_SERVER_GONE_CODE, "MySQL server has gone away");
        assert_eq!(classify_db_error(&err), RetryClass::Timeout);
    }

    #[test]
    fn classifies_unrelated_integrity_error_as_other() {
        let err = db_error("1062", "Duplicate entry for key");
        assert_eq!(classify_db_error(&err), RetryClass::Other);
    }

    #[test]
    fn retry_class_is_retryable() {
        assert!(RetryClass::Deadlock.is_retryable());
        assert!(RetryClass::Timeout.is_retryable());
        assert!(!RetryClass::Other.is_retryable());
    }
}
