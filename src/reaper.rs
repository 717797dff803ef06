//! Periodic eviction of abandoned sessions and idle rate-limit windows.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::rate_limiter::RateLimiter;
use crate::session::{SessionStore, SweepReport};

/// Run one sweep: drop sessions older than `ttl` and rate windows with no
/// recent requests.
pub fn sweep_once(
    sessions: &SessionStore,
    limiter: &RateLimiter,
    now: Instant,
    ttl: Duration,
) -> SweepReport {
    let report = sessions.sweep_expired(now, ttl);
    let pruned_windows = limiter.prune_idle(now);

    crate::observability::record_sessions_expired(report.removed);

    if report.removed > 0 {
        info!(
            removed = report.removed,
            released_bytes = report.released_bytes,
            remaining = report.remaining,
            pruned_windows,
            "Expired sessions swept"
        );
    } else {
        debug!(
            remaining = report.remaining,
            pruned_windows,
            "Session sweep found nothing to expire"
        );
    }

    report
}

/// Start the background reaper; it stops when `shutdown` is cancelled.
pub fn spawn_session_reaper(
    sessions: Arc<SessionStore>,
    limiter: Arc<RateLimiter>,
    config: SessionConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let ttl = config.ttl();
    let period = config.sweep_interval();

    tokio::spawn(async move {
        info!(
            ttl_secs = ttl.as_secs(),
            sweep_interval_secs = period.as_secs(),
            "Session reaper started"
        );
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    sweep_once(&sessions, &limiter, Instant::now(), ttl);
                }
            }
        }

        info!("Session reaper stopped");
    })
}
