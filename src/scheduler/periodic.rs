//! # Periodic Loops
//!
//! Both background loops follow the same sleep-then-act shape: wait, act,
//! then wait the regular interval after a success or the retry backoff after
//! a failure. Failures are logged and never end the loop; only the shutdown
//! token does.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::refresher::{CacheRefresher, RefreshOutcome};
use crate::auth::TokenAccessor;
use crate::core::config::{CredentialsConfig, PrecacheConfig};
use crate::core::error::ProxyResult;

/// Timing of a periodic loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub retry_backoff: Duration,
}

impl Schedule {
    pub fn token(config: &CredentialsConfig) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            interval: config.refresh_interval,
            retry_backoff: config.retry_backoff,
        }
    }

    pub fn cache(config: &PrecacheConfig) -> Self {
        Self {
            initial_delay: config.initial_delay,
            interval: config.refresh_interval,
            retry_backoff: config.retry_backoff,
        }
    }
}

/// Run `act` on `schedule` until `shutdown` is cancelled
pub async fn run_periodic<F, Fut>(name: &'static str, schedule: Schedule, shutdown: CancellationToken, mut act: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProxyResult<()>>,
{
    info!(task = name, ?schedule, "⏰ Periodic task started");
    let mut delay = schedule.initial_delay;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = act() => result,
        };

        delay = match result {
            Ok(()) => {
                debug!(task = name, next_in = ?schedule.interval, "Periodic task succeeded");
                schedule.interval
            }
            Err(e) => {
                error!(task = name, retry_in = ?schedule.retry_backoff, "Periodic task failed: {}", e);
                schedule.retry_backoff
            }
        };
    }

    info!(task = name, "Periodic task stopped");
}

/// Keep the credential store topped up in the background
///
/// The first tick only fills an empty or stale store, so a request that
/// already acquired a token at startup is not followed by a second one.
/// Later ticks always acquire.
pub fn spawn_token_loop(
    accessor: Arc<TokenAccessor>,
    schedule: Schedule,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut first_tick = true;
    tokio::spawn(run_periodic("token-refresh", schedule, shutdown, move || {
        let accessor = accessor.clone();
        let startup = std::mem::take(&mut first_tick);
        async move {
            if startup {
                accessor.get_valid().await.map(|_| ())
            } else {
                accessor.refresh().await.map(|_| ())
            }
        }
    }))
}

/// Re-walk the taxonomy tree from the canonical root in the background
pub fn spawn_cache_loop(
    refresher: Arc<CacheRefresher>,
    schedule: Schedule,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_periodic("cache-refresh", schedule, shutdown, move || {
        let refresher = refresher.clone();
        async move {
            match refresher.refresh_now().await? {
                RefreshOutcome::Completed(_) => {}
                RefreshOutcome::AlreadyRunning => {
                    info!("Scheduled refresh skipped, a refresh is already running");
                }
            }
            Ok(())
        }
    }))
}
