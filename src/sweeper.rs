use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::model::now_ms;
use crate::observability;

/// Background task that periodically transitions overrun sessions to
/// expired and returns their capacity to the ledger. One failed session
/// never aborts the rest of the tick.
pub async fn run_sweeper(engine: Arc<Engine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        sweep_once(&engine).await;
    }
}

pub async fn sweep_once(engine: &Engine) {
    let now = now_ms();
    let expired = engine.collect_expired(now);
    for session_id in expired {
        match engine.expire_session(session_id).await {
            Ok(true) => {
                metrics::counter!(observability::SESSIONS_EXPIRED_TOTAL).increment(1);
                info!("expired session {session_id}");
            }
            // Cancelled (or already expired) between scan and transition
            Ok(false) => debug!("sweep skip {session_id}: no longer active"),
            Err(e) => warn!("sweep of {session_id} failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeeSchedule;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("parkd_test_sweeper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    async fn test_engine(name: &str) -> Arc<Engine> {
        let notify = Arc::new(NotifyHub::new("parking_updates"));
        Arc::new(Engine::new(test_wal_path(name), notify, FeeSchedule::default()).unwrap())
    }

    async fn seed_spot(engine: &Engine, total: u32) -> Ulid {
        let id = Ulid::new();
        engine
            .create_spot(
                id,
                "Mission & 5th".into(),
                "501 Mission St".into(),
                37.78,
                -122.4,
                250,
                total,
                "downtown".into(),
                vec![],
            )
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn sweep_expires_overrun_sessions_and_releases_capacity() {
        let engine = test_engine("sweep_expires.wal").await;
        let spot = seed_spot(&engine, 2).await;

        let session = engine.create_session("ABC123", spot, 1, 255).await.unwrap();
        assert_eq!(engine.spot(spot).await.unwrap().available_spots, 1);

        // Nothing has run out yet.
        assert!(engine.collect_expired(now_ms()).is_empty());

        // Pretend the window closed.
        let past_end = session.end + 1;
        let expired = engine.collect_expired(past_end);
        assert_eq!(expired, vec![session.id]);

        assert!(engine.expire_session(session.id).await.unwrap());
        let swept = engine.session(session.id).await.unwrap();
        assert_eq!(swept.status, SessionStatus::Expired);
        assert_eq!(engine.spot(spot).await.unwrap().available_spots, 2);

        // Plate is free again.
        engine.create_session("ABC123", spot, 30, 100).await.unwrap();
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let engine = test_engine("sweep_idempotent.wal").await;
        let spot = seed_spot(&engine, 1).await;
        let session = engine.create_session("XYZ789", spot, 1, 100).await.unwrap();

        assert!(engine.expire_session(session.id).await.unwrap());
        // Second pass over the same session is a guarded no-op.
        assert!(!engine.expire_session(session.id).await.unwrap());
        assert_eq!(engine.spot(spot).await.unwrap().available_spots, 1);

        // A full sweep with nothing expired changes nothing.
        sweep_once(&engine).await;
        assert_eq!(engine.spot(spot).await.unwrap().available_spots, 1);
    }

    #[tokio::test]
    async fn sweep_leaves_cancelled_sessions_alone() {
        let engine = test_engine("sweep_cancelled.wal").await;
        let spot = seed_spot(&engine, 1).await;
        let session = engine.create_session("CAB321", spot, 1, 100).await.unwrap();

        engine.cancel_session(session.id).await.unwrap();
        // The scan-to-transition race: expire after a concurrent cancel must
        // not overwrite the cancelled status.
        assert!(!engine.expire_session(session.id).await.unwrap());
        assert_eq!(
            engine.session(session.id).await.unwrap().status,
            SessionStatus::Cancelled
        );
        // Capacity was returned exactly once (by the cancel).
        assert_eq!(engine.spot(spot).await.unwrap().available_spots, 1);
    }
}
