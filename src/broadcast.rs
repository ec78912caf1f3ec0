use crate::state::SessionController;
use crate::types::Phase;
use std::sync::Arc;
use std::time::Duration;

/// How often the live round is reconciled with the backend
pub const VOTE_SYNC_INTERVAL: Duration = Duration::from_millis(500);

/// Spawn a background task that pulls votes cast through other clients
/// into the live round during VOTING phase
pub fn spawn_vote_sync(controller: Arc<SessionController>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(VOTE_SYNC_INTERVAL).await;

            if controller.phase().await != Phase::Voting {
                continue;
            }

            // A failed session waits for a manual reconnect
            if !controller.is_available().await {
                continue;
            }

            if let Err(e) = controller.sync_votes().await {
                tracing::warn!("Vote sync failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_scenarios, InMemoryRoomBackend, RoomBackend};
    use crate::protocol::ServerMessage;
    use crate::types::*;

    #[tokio::test(start_paused = true)]
    async fn test_vote_sync_picks_up_remote_votes() {
        let backend = Arc::new(InMemoryRoomBackend::new(default_scenarios()));
        backend.create_room("SYNC01").await;
        let controller = Arc::new(SessionController::new(
            "SYNC01",
            backend.clone(),
            GameConfig::default(),
        ));
        controller.connect().await.unwrap();
        let round = controller.start_scenario(&Role::Facilitator).await.unwrap();

        let mut rx = controller.subscribe();
        let task = spawn_vote_sync(controller.clone());

        let remote = Vote {
            participant_id: "other-tab".to_string(),
            choice: Choice::Pull,
            rationale: "greater good".to_string(),
            moderated: false,
            ts: chrono::Utc::now().to_rfc3339(),
        };
        backend.submit_vote("SYNC01", &round.id, &remote).await.unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(controller.has_voted("other-tab").await);

        let mut saw_counts = false;
        while let Ok(msg) = rx.try_recv() {
            if let ServerMessage::VoteCounts { tally, .. } = msg {
                assert_eq!(tally.pull, 1);
                saw_counts = true;
            }
        }
        assert!(saw_counts);
        task.abort();
    }
}
