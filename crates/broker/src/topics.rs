//! Topic and header naming conventions (§6).

/// Header carrying the payload schema tag, e.g. `"ipang.qa.v1"`.
pub const HEADER_SCHEMA: &str = "schema";
/// Header carrying the external user id the message is keyed on.
pub const HEADER_USER_ID: &str = "user_id";
/// Header carrying the Unix-seconds occurrence time, preferred over the
/// broker message timestamp when present.
pub const HEADER_OCCURRED: &str = "occurred";

/// Component-specific headers carried alongside the ones above (§6).
pub mod component_headers {
    pub const MSG_TYPE: &str = "kf_msg_type";
    pub const ORIGIN: &str = "kf_origin";
    pub const OPEN_KFID: &str = "kf_open_kfid";
    pub const MSG_ID: &str = "kf_msg_id";
    pub const SEND_TIME: &str = "kf_send_time";
}

/// Headers a DLQ envelope adds on top of the preserved original headers
/// (§4.5).
pub const HEADER_DLQ_SOURCE: &str = "dlq_source";
pub const HEADER_DLQ_TIMESTAMP: &str = "dlq_timestamp";

/// Recommended partition count for the primary log topic (§6).
pub const RECOMMENDED_PARTITIONS: i32 = 24;
/// Recommended replication factor for the primary log topic (§6).
pub const RECOMMENDED_REPLICATION_FACTOR: i32 = 3;
/// Per-message size ceiling that must be aligned across topic, broker
/// replica-fetch, producer, and consumer settings (§6).
pub const MAX_MESSAGE_BYTES: i32 = 6 * 1024 * 1024;
/// Consumer `fetch.max.bytes` floor (§6).
pub const MIN_FETCH_MAX_BYTES: i32 = 64 * 1024 * 1024;

/// Static description of a topic this pipeline produces to or consumes
/// from, mirroring the builder-style config the upstream log topic is
/// provisioned with.
#[derive(Debug, Clone)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
}

impl TopicSpec {
    pub fn primary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: RECOMMENDED_PARTITIONS,
            replication_factor: RECOMMENDED_REPLICATION_FACTOR,
        }
    }

    pub fn dlq(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: RECOMMENDED_PARTITIONS,
            replication_factor: RECOMMENDED_REPLICATION_FACTOR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_topic_uses_recommended_partition_layout() {
        let spec = TopicSpec::primary("chat.events.v1");
        assert_eq!(spec.partitions, 24);
        assert_eq!(spec.replication_factor, 3);
    }
}
