//! Cursor-store configuration (§6 "Cursor KV keys", §4.1 defaults).

use serde::{Deserialize, Serialize};

fn default_key_prefix() -> String {
    "pipeline".to_string()
}

fn default_lease_ttl_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    800
}

fn default_cas_retry_attempts() -> u32 {
    3
}

fn default_cas_retry_delay_ms() -> u64 {
    50
}

/// Configuration for the leader-elected cursor store and fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorStoreConfig {
    /// Redis connection URL.
    pub redis_url: String,
    /// Key prefix, per §6: `<prefix>:cursor:*`.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Optional logical application id; when unset, the cursor value key
    /// falls back to `<prefix>:cursor:value`.
    pub app_id: Option<String>,
    /// Lease TTL; renewal fires every `ttl/3`.
    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,
    /// Poll interval between acquisition attempts after a failed attempt.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Retry budget for transient KV I/O errors.
    #[serde(default = "default_cas_retry_attempts")]
    pub cas_retry_attempts: u32,
    /// Delay between transient-error retries.
    #[serde(default = "default_cas_retry_delay_ms")]
    pub cas_retry_delay_ms: u64,
    /// Optional path to the local shadow file.
    pub shadow_path: Option<std::path::PathBuf>,
}

impl Default for CursorStoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: default_key_prefix(),
            app_id: None,
            lease_ttl_ms: default_lease_ttl_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            cas_retry_attempts: default_cas_retry_attempts(),
            cas_retry_delay_ms: default_cas_retry_delay_ms(),
            shadow_path: None,
        }
    }
}

impl CursorStoreConfig {
    pub fn key_epoch(&self) -> String {
        format!("{}:cursor:epoch", self.key_prefix)
    }

    pub fn key_lease(&self) -> String {
        format!("{}:cursor:lease", self.key_prefix)
    }

    pub fn key_version(&self) -> String {
        format!("{}:cursor:version", self.key_prefix)
    }

    pub fn key_value(&self) -> String {
        match &self.app_id {
            Some(app_id) => format!("{}:cursor:{}:value", self.key_prefix, app_id),
            None => format!("{}:cursor:value", self.key_prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_unscoped_value_key_without_app_id() {
        let cfg = CursorStoreConfig {
            key_prefix: "acme".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.key_value(), "acme:cursor:value");
    }

    #[test]
    fn scopes_value_key_to_app_id_when_present() {
        let cfg = CursorStoreConfig {
            key_prefix: "acme".to_string(),
            app_id: Some("chatbot".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.key_value(), "acme:cursor:chatbot:value");
    }

    #[test]
    fn default_config_matches_documented_defaults() {
        let cfg = CursorStoreConfig::default();
        assert_eq!(cfg.lease_ttl_ms, 10_000);
        assert_eq!(cfg.poll_interval_ms, 800);
        assert_eq!(cfg.cas_retry_attempts, 3);
        assert_eq!(cfg.cas_retry_delay_ms, 50);
    }
}
