//! Session expiry tests for the reaper.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use stashbot::config::SessionConfig;
use stashbot::rate_limiter::RateLimiter;
use stashbot::reaper::{spawn_session_reaper, sweep_once};
use stashbot::session::{PendingFile, PendingImage, PendingPayload, Session, SessionStore};

const TTL: Duration = Duration::from_secs(3600);

fn pending_file() -> PendingPayload {
    PendingPayload::Description(PendingFile {
        handle: "h".to_string(),
        file_name: "a.pdf".to_string(),
        file_type: "application/pdf".to_string(),
        size: 10,
    })
}

#[test]
fn test_session_older_than_ttl_is_removed() {
    let sessions = SessionStore::new();
    let limiter = RateLimiter::default();
    let base = Instant::now();

    sessions.put(1, Session::new_at(pending_file(), base));
    sessions.put(
        2,
        Session::new_at(
            PendingPayload::BackgroundChoice(PendingImage {
                bytes: vec![0; 1000],
            }),
            base + Duration::from_secs(2),
        ),
    );

    // 3599 s after the first session: nothing expires
    let report = sweep_once(&sessions, &limiter, base + Duration::from_secs(3599), TTL);
    assert_eq!(report.removed, 0);
    assert_eq!(sessions.len(), 2);

    // Exactly at the TTL the session survives
    let report = sweep_once(&sessions, &limiter, base + TTL, TTL);
    assert_eq!(report.removed, 0);

    // 3601 s: only the first one is strictly older than the TTL
    let report = sweep_once(&sessions, &limiter, base + Duration::from_secs(3601), TTL);
    assert_eq!(report.removed, 1);
    assert_eq!(report.remaining, 1);
    assert!(sessions.get(1).is_none());
    assert!(sessions.get(2).is_some());

    let report = sweep_once(&sessions, &limiter, base + Duration::from_secs(3603), TTL);
    assert_eq!(report.removed, 1);
    assert_eq!(report.released_bytes, 1000);
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn test_spawned_reaper_sweeps_and_stops_on_cancel() {
    let sessions = Arc::new(SessionStore::new());
    let limiter = Arc::new(RateLimiter::default());
    let shutdown = CancellationToken::new();

    // Already older than the one-second TTL
    sessions.put(
        9,
        Session::new_at(pending_file(), Instant::now() - Duration::from_secs(5)),
    );

    let config = SessionConfig {
        ttl_secs: 1,
        sweep_interval_secs: 1,
    };
    let handle = spawn_session_reaper(
        Arc::clone(&sessions),
        Arc::clone(&limiter),
        config,
        shutdown.clone(),
    );

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(sessions.is_empty());

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("reaper stops after cancel")
        .expect("reaper task did not panic");
}
