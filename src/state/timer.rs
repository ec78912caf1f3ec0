use super::SessionController;
use crate::announce::{Announcement, TIMER_ANNOUNCE_THRESHOLDS};
use crate::protocol::ServerMessage;
use crate::types::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// The one countdown task, tagged with the round it belongs to
pub(super) struct Countdown {
    round_id: RoundId,
    handle: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick belongs to a round that is no longer voting
    Stale,
    Running(u32),
    Expired,
}

impl SessionController {
    /// Spawn the per-second countdown for a round, replacing any previous one
    pub(super) fn spawn_countdown(self: &Arc<Self>, round_id: RoundId) {
        let controller = Arc::clone(self);
        let task_round_id = round_id.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // First tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                match controller.tick(&task_round_id).await {
                    TickOutcome::Running(_) => continue,
                    TickOutcome::Expired => {
                        tracing::debug!(round_id = %task_round_id, "Countdown expired");
                        break;
                    }
                    TickOutcome::Stale => {
                        tracing::debug!(round_id = %task_round_id, "Dropping stale countdown");
                        break;
                    }
                }
            }
        });

        let mut slot = match self.countdown.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = slot.replace(Countdown { round_id, handle }) {
            previous.handle.abort();
        }
    }

    /// Abort the countdown if it still belongs to `round_id`
    pub(super) fn cancel_countdown(&self, round_id: &RoundId) {
        let mut slot = match self.countdown.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.as_ref().is_some_and(|c| c.round_id == *round_id) {
            if let Some(countdown) = slot.take() {
                countdown.handle.abort();
                tracing::debug!(round_id = %round_id, "Countdown cancelled");
            }
        }
    }

    /// Advance the countdown of `round_id` by one second.
    ///
    /// Keyed by round identity: a tick for any round other than the live
    /// voting one does nothing.
    pub async fn tick(&self, round_id: &RoundId) -> TickOutcome {
        let seconds_remaining = {
            let mut session = self.session.write().await;
            if session.round.id != *round_id || session.round.phase != Phase::Voting {
                return TickOutcome::Stale;
            }
            session.round.seconds_remaining = session.round.seconds_remaining.saturating_sub(1);
            session.round.seconds_remaining
        };

        self.broadcast_to_all(ServerMessage::Timer {
            round_id: round_id.clone(),
            seconds_remaining,
        });

        if seconds_remaining == 0 {
            // The facilitator may have closed the round in between; that is fine
            self.close_voting(round_id).await;
            return TickOutcome::Expired;
        }

        if TIMER_ANNOUNCE_THRESHOLDS.contains(&seconds_remaining) {
            self.announce_room(Announcement::Timer { seconds_remaining });
        }
        TickOutcome::Running(seconds_remaining)
    }
}
