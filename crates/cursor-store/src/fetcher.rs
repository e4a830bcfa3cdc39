//! The single-writer fetcher loop (§4.1 `Run(callback)`).

use std::future::Future;
use std::time::Duration;

use telemetry::metrics;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::store::CursorStore;

/// Context handed to the hosted callback for the duration of one
/// leadership cycle: the epoch it was acquired at, and a token that is
/// cancelled the moment the lease is lost (renewal failure) or the
/// fetcher itself is shut down.
#[derive(Clone)]
pub struct FetcherContext {
    pub epoch: u64,
    cancel: CancellationToken,
}

impl FetcherContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Drives the acquire → callback → release → poll loop.
pub struct Fetcher {
    store: CursorStore,
}

impl Fetcher {
    pub fn new(store: CursorStore) -> Self {
        Self { store }
    }

    /// Runs forever (until `shutdown` is cancelled), acquiring leadership,
    /// invoking `callback` for the duration of each successful cycle, and
    /// sleeping `poll_interval_ms` after a failed acquisition attempt.
    pub async fn run<F, Fut>(&self, shutdown: CancellationToken, mut callback: F)
    where
        F: FnMut(FetcherContext) -> Fut,
        Fut: Future<Output = ()>,
    {
        let poll_interval = Duration::from_millis(self.store.config().poll_interval_ms);

        while !shutdown.is_cancelled() {
            match self.store.acquire_leadership().await {
                Ok((epoch, Some(lease))) => {
                    metrics().fetcher_cycles.inc();
                    let cycle_cancel = CancellationToken::new();
                    let ctx = FetcherContext {
                        epoch,
                        cancel: cycle_cancel.clone(),
                    };

                    tokio::select! {
                        _ = callback(ctx) => {}
                        _ = lease.cancelled() => {
                            warn!(epoch, "leadership lost mid-cycle, cancelling callback");
                            cycle_cancel.cancel();
                        }
                        _ = shutdown.cancelled() => {
                            cycle_cancel.cancel();
                        }
                    }

                    lease.release(&self.store).await;
                }
                Ok((epoch, None)) => {
                    info!(epoch, "leadership not acquired this cycle");
                    tokio::time::sleep(poll_interval).await;
                }
                Err(err) => {
                    warn!(error = %err, "cursor store error during acquisition");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }
}
