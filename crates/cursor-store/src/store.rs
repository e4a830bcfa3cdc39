//! Redis-backed cursor store: leadership acquisition, lease renewal, and
//! CAS-guarded cursor advance (§4.1).
//!
//! Grounded on the SET-NX-PX + Lua-script CAS pattern used for
//! distributed locking elsewhere in this codebase's lineage, generalized
//! from a simple mutex into a fencing-epoch cursor CAS.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pipeline_core::error::CursorError;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use telemetry::metrics;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CursorStoreConfig;
use crate::record::{CasOutcome, CursorRecord};

/// `if GET(lease) != epoch -> LOST; if GET(version) != expectVersion ->
/// CONFLICT; else SET(value); INCR(version); OK` (§4.1).
const CAS_SCRIPT: &str = r#"
local lease = redis.call('get', KEYS[1])
if lease ~= ARGV[1] then
    return 'LOST'
end
local version = redis.call('get', KEYS[2])
if version == false then
    version = '0'
end
if version ~= ARGV[2] then
    return 'CONFLICT'
end
redis.call('set', KEYS[3], ARGV[3])
redis.call('incr', KEYS[2])
return 'OK'
"#;

/// Lease renewal script: checks `lease == epoch` then `PEXPIRE`. Returns 0
/// (lost) or 1 (renewed).
const RENEW_SCRIPT: &str = r#"
local lease = redis.call('get', KEYS[1])
if lease ~= ARGV[1] then
    return 0
end
redis.call('pexpire', KEYS[1], ARGV[2])
return 1
"#;

/// A held lease: the epoch it was acquired at, and a cancellation token
/// the renewal task closes exactly once when it observes LOST (§9 "cyclic
/// concerns" — modeled as a sentinel signal, never a freeable shared
/// resource).
pub struct LeaseHandle {
    pub epoch: u64,
    cancel: CancellationToken,
    renew_task: Option<JoinHandle<()>>,
}

impl LeaseHandle {
    /// Resolves when the lease is lost (renewal failed or was explicitly
    /// released).
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn is_lost(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops the renewal task and releases the lease.
    pub async fn release(mut self, store: &CursorStore) {
        self.cancel.cancel();
        if let Some(task) = self.renew_task.take() {
            let _ = task.await;
        }
        store.release_lease(self.epoch).await;
    }
}

/// Redis-backed cursor store. One instance is shared by the fetcher and
/// its background renewal task.
#[derive(Clone)]
pub struct CursorStore {
    conn: ConnectionManager,
    config: Arc<CursorStoreConfig>,
    cas_script: Arc<Script>,
    renew_script: Arc<Script>,
    local_epoch: Arc<AtomicU64>,
}

impl CursorStore {
    pub async fn connect(config: CursorStoreConfig) -> Result<Self, CursorError> {
        let client = redis::Client::open(config.redis_url.clone())?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            config: Arc::new(config),
            cas_script: Arc::new(Script::new(CAS_SCRIPT)),
            renew_script: Arc::new(Script::new(RENEW_SCRIPT)),
            local_epoch: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn config(&self) -> &CursorStoreConfig {
        &self.config
    }

    /// `AcquireLeadership` (§4.1): increments `epoch` unconditionally,
    /// then attempts `SET lease = epoch IF NOT EXISTS EX ttl`. On success,
    /// spawns the background renewal task and returns a `LeaseHandle`.
    pub async fn acquire_leadership(&self) -> Result<(u64, Option<LeaseHandle>), CursorError> {
        let mut conn = self.conn.clone();
        let epoch: u64 = conn.incr(self.config.key_epoch(), 1u64).await?;
        self.local_epoch.store(epoch, Ordering::SeqCst);

        let options = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::PX(self.config.lease_ttl_ms as usize));

        let result: Option<String> = conn
            .set_options(self.config.key_lease(), epoch.to_string(), options)
            .await?;

        if result.is_none() {
            debug!(epoch, "leadership acquisition failed: lease already held");
            return Ok((epoch, None));
        }

        info!(epoch, "acquired cursor-store leadership");
        metrics().leadership_acquired.inc();
        let cancel = CancellationToken::new();
        let renew_task = self.spawn_renewal(epoch, cancel.clone());

        Ok((
            epoch,
            Some(LeaseHandle {
                epoch,
                cancel,
                renew_task: Some(renew_task),
            }),
        ))
    }

    fn spawn_renewal(&self, epoch: u64, cancel: CancellationToken) -> JoinHandle<()> {
        let store = self.clone();
        let interval = Duration::from_millis(self.config.lease_ttl_ms / 3).max(Duration::from_millis(1));
        let ttl_ms = self.config.lease_ttl_ms;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return;
                    }
                    _ = ticker.tick() => {
                        match store.try_renew(epoch, ttl_ms).await {
                            Ok(true) => {
                                debug!(epoch, "renewed cursor-store lease");
                            }
                            Ok(false) => {
                                warn!(epoch, "lease renewal lost: lease expired or stolen");
                                metrics().leadership_lost.inc();
                                cancel.cancel();
                                return;
                            }
                            Err(err) => {
                                warn!(epoch, error = %err, "transient error renewing lease");
                            }
                        }
                    }
                }
            }
        })
    }

    async fn try_renew(&self, epoch: u64, ttl_ms: u64) -> Result<bool, CursorError> {
        let mut conn = self.conn.clone();
        let result: i64 = self
            .renew_script
            .key(self.config.key_lease())
            .arg(epoch.to_string())
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(result == 1)
    }

    async fn release_lease(&self, epoch: u64) {
        let mut conn = self.conn.clone();
        let current: Option<String> = conn.get(self.config.key_lease()).await.ok().flatten();
        if current.as_deref() == Some(epoch.to_string().as_str()) {
            let _: Result<(), _> = conn.del(self.config.key_lease()).await;
        }
    }

    /// `LoadCursor` (§4.1): reads value and version in one round; missing
    /// keys return the empty cursor.
    pub async fn load_cursor(&self) -> Result<CursorRecord, CursorError> {
        let mut conn = self.conn.clone();
        let (value, version): (Option<String>, Option<u64>) = redis::pipe()
            .get(self.config.key_value())
            .get(self.config.key_version())
            .query_async(&mut conn)
            .await?;

        Ok(CursorRecord {
            value: value.unwrap_or_default(),
            version: version.unwrap_or(0),
        })
    }

    /// `UpdateCursorCAS` (§4.1). Transient I/O errors are retried up to
    /// `cas_retry_attempts` times with `cas_retry_delay_ms` between tries.
    pub async fn update_cursor_cas(
        &self,
        epoch: u64,
        expect_version: u64,
        new_value: &str,
    ) -> Result<CasOutcome, CursorError> {
        let attempts = self.config.cas_retry_attempts.max(1);
        let mut last_err = None;

        for attempt in 0..attempts {
            match self.try_cas(epoch, expect_version, new_value).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    last_err = Some(err);
                    if attempt + 1 < attempts {
                        metrics().cas_retries.inc();
                        tokio::time::sleep(Duration::from_millis(self.config.cas_retry_delay_ms))
                            .await;
                    }
                }
            }
        }

        Err(CursorError::Transient {
            attempts,
            source: match last_err {
                Some(CursorError::Redis(e)) => e,
                _ => redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "cas retry budget exhausted",
                )),
            },
        })
    }

    async fn try_cas(
        &self,
        epoch: u64,
        expect_version: u64,
        new_value: &str,
    ) -> Result<CasOutcome, CursorError> {
        let mut conn = self.conn.clone();
        let result: String = self
            .cas_script
            .key(self.config.key_lease())
            .key(self.config.key_version())
            .key(self.config.key_value())
            .arg(epoch.to_string())
            .arg(expect_version.to_string())
            .arg(new_value)
            .invoke_async(&mut conn)
            .await?;

        match result.as_str() {
            "OK" => Ok(CasOutcome::Ok {
                new_version: expect_version + 1,
            }),
            "LOST" => Ok(CasOutcome::Lost),
            "CONFLICT" => {
                metrics().cas_conflicts.inc();
                Ok(CasOutcome::Conflict)
            }
            other => Err(CursorError::ShadowCorrupt(format!(
                "unexpected CAS script result: {other}"
            ))),
        }
    }
}
