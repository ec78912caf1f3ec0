use super::{SessionController, SessionError};
use crate::announce::Announcement;
use crate::protocol::ServerMessage;
use crate::types::*;
use crate::wordcloud::{WordClouds, DEFAULT_CLOUD_SIZE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Frozen outcome of a round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundResults {
    pub round_id: RoundId,
    pub tally: VoteTally,
    pub decision: Choice,
    pub clouds: WordClouds,
}

impl RoundResults {
    pub fn from_round(round: &RoundState) -> Self {
        let tally = round.tally();
        Self {
            round_id: round.id.clone(),
            tally,
            decision: tally.decision(),
            clouds: WordClouds::from_votes(round.votes.values(), DEFAULT_CLOUD_SIZE),
        }
    }
}

impl SessionController {
    /// Check if a phase transition is valid
    pub fn is_valid_phase_transition(from: Phase, to: Phase) -> bool {
        use Phase::*;

        matches!(
            (from, to),
            (Waiting, Voting) | (Voting, Results) | (Results, Waiting) | (Results, Complete)
        )
    }

    fn ensure_transition(from: Phase, to: Phase) -> Result<(), SessionError> {
        if !Self::is_valid_phase_transition(from, to) {
            return Err(SessionError::InvalidTransition(format!(
                "{:?} -> {:?}",
                from, to
            )));
        }
        Ok(())
    }

    /// Facilitator-set countdown length for upcoming rounds
    pub async fn set_voting_seconds(&self, role: &Role, seconds: u32) -> Result<(), SessionError> {
        Self::require_facilitator(role, "set the timer")?;
        if !(MIN_VOTING_SECONDS..=MAX_VOTING_SECONDS).contains(&seconds) {
            return Err(SessionError::InvalidTimer(seconds));
        }

        let mut session = self.session.write().await;
        if session.round.phase != Phase::Waiting {
            return Err(SessionError::InvalidTransition(
                "timer can only change between rounds".to_string(),
            ));
        }
        session.voting_seconds = seconds;
        drop(session);

        tracing::info!(seconds, "Voting timer set");
        self.broadcast_to_all(ServerMessage::TimerSet { seconds });
        Ok(())
    }

    /// Open voting on the current scenario and start the countdown
    pub async fn start_scenario(self: &Arc<Self>, role: &Role) -> Result<RoundState, SessionError> {
        Self::require_facilitator(role, "start scenarios")?;
        if !self.is_available().await {
            return Err(SessionError::SessionUnavailable);
        }

        let (scenario, index, total) = {
            let mut session = self.session.write().await;
            Self::ensure_transition(session.round.phase, Phase::Voting)?;
            if session.start_pending {
                return Err(SessionError::InvalidTransition(
                    "a scenario start is already in progress".to_string(),
                ));
            }
            if !session.can_start {
                return Err(SessionError::ScenarioLoadFailure(
                    "no scenario deck loaded".to_string(),
                ));
            }
            let scenario = session
                .scenarios
                .get(session.scenario_index)
                .cloned()
                .ok_or_else(|| {
                    SessionError::ScenarioLoadFailure("scenario index out of range".to_string())
                })?;
            // Held until the backend knows the new round id
            session.start_pending = true;
            (scenario, session.scenario_index, session.scenarios.len())
        };

        let round_id = ulid::Ulid::new().to_string();

        self.set_connection(ConnectionState::Loading).await;
        if let Err(e) = self
            .backend
            .start_scenario(&self.room_code, &round_id, &scenario.id)
            .await
        {
            self.session.write().await.start_pending = false;
            let err = SessionError::from(e);
            if err.is_blocking() {
                self.fail_connection(err.to_string()).await;
            } else {
                self.finish_loading().await;
            }
            return Err(err);
        }

        let round = {
            let mut session = self.session.write().await;
            session.start_pending = false;
            session.round = RoundState {
                id: round_id.clone(),
                phase: Phase::Voting,
                scenario: Some(scenario.clone()),
                votes: Default::default(),
                seconds_remaining: session.voting_seconds,
            };
            session.pending_votes.clear();
            session.round.clone()
        };

        self.finish_loading().await;
        self.spawn_countdown(round_id);

        tracing::info!(
            round_id = %round.id,
            scenario = %scenario.title,
            seconds = round.seconds_remaining,
            "Scenario started"
        );
        self.broadcast_phase(&round, index, total);
        self.announce_room(Announcement::PhaseChanged {
            phase: Phase::Voting,
        });
        self.announce_room(Announcement::ScenarioChanged {
            index,
            total,
            title: scenario.title,
        });

        Ok(round)
    }

    /// Facilitator forces results early, whatever the timer says
    pub async fn end_voting(&self, role: &Role) -> Result<RoundResults, SessionError> {
        Self::require_facilitator(role, "end voting")?;

        let round_id = self.session.read().await.round.id.clone();
        let results = self.close_voting(&round_id).await.ok_or_else(|| {
            SessionError::InvalidTransition("voting is not open".to_string())
        })?;
        self.cancel_countdown(&round_id);
        Ok(results)
    }

    /// The single voting -> results edge shared by timer expiry and the facilitator.
    ///
    /// Returns None when the round is no longer voting (the other trigger won,
    /// or the round was superseded).
    pub(super) async fn close_voting(&self, round_id: &RoundId) -> Option<RoundResults> {
        let (results, round, index, total) = {
            let mut session = self.session.write().await;
            if session.round.id != *round_id || session.round.phase != Phase::Voting {
                return None;
            }
            session.round.phase = Phase::Results;
            session.round.seconds_remaining = 0;
            (
                RoundResults::from_round(&session.round),
                session.round.clone(),
                session.scenario_index,
                session.scenarios.len(),
            )
        };

        tracing::info!(
            round_id = %round_id,
            pull = results.tally.pull,
            dont_pull = results.tally.dont_pull,
            decision = ?results.decision,
            "Voting closed"
        );

        self.broadcast_phase(&round, index, total);
        self.broadcast_results(&results);
        self.announce_room(Announcement::Results {
            tally: results.tally,
            decision: results.decision,
        });
        self.announce_room(Announcement::PhaseChanged {
            phase: Phase::Results,
        });
        Some(results)
    }

    /// Move past the results: next scenario, or finish the session
    pub async fn next_scenario(&self, role: &Role) -> Result<Phase, SessionError> {
        Self::require_facilitator(role, "advance scenarios")?;

        let (round, index, total) = {
            let mut session = self.session.write().await;
            let next_index = session.scenario_index + 1;
            let next_phase = if next_index < session.scenarios.len() {
                Phase::Waiting
            } else {
                Phase::Complete
            };
            Self::ensure_transition(session.round.phase, next_phase)?;

            // Per-round state is reset wholesale
            session.round = RoundState::waiting();
            session.round.phase = next_phase;
            session.pending_votes.clear();
            if next_phase == Phase::Waiting {
                session.scenario_index = next_index;
            } else {
                session.can_start = false;
            }
            (
                session.round.clone(),
                session.scenario_index,
                session.scenarios.len(),
            )
        };

        tracing::info!(phase = ?round.phase, scenario_index = index, "Advanced session");
        self.broadcast_phase(&round, index, total);
        self.announce_room(Announcement::PhaseChanged { phase: round.phase });

        Ok(round.phase)
    }

    fn broadcast_phase(&self, round: &RoundState, scenario_index: usize, scenario_count: usize) {
        self.broadcast_to_all(ServerMessage::Phase {
            phase: round.phase,
            round_id: round.id.clone(),
            scenario: round.scenario.clone(),
            scenario_index,
            scenario_count,
            seconds_remaining: round.seconds_remaining,
        });
    }

    pub(super) fn broadcast_results(&self, results: &RoundResults) {
        self.broadcast_to_all(ServerMessage::Results {
            round_id: results.round_id.clone(),
            tally: results.tally,
            decision: results.decision,
            clouds: results.clouds.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_phase_transition_table() {
        use Phase::*;
        assert!(SessionController::is_valid_phase_transition(Waiting, Voting));
        assert!(SessionController::is_valid_phase_transition(Voting, Results));
        assert!(SessionController::is_valid_phase_transition(Results, Waiting));
        assert!(SessionController::is_valid_phase_transition(Results, Complete));

        assert!(!SessionController::is_valid_phase_transition(Waiting, Results));
        assert!(!SessionController::is_valid_phase_transition(Voting, Waiting));
        assert!(!SessionController::is_valid_phase_transition(Complete, Voting));
    }

    #[tokio::test]
    async fn test_start_scenario_opens_voting_with_empty_votes() {
        let h = harness().await;
        let round = h
            .controller
            .start_scenario(&Role::Facilitator)
            .await
            .unwrap();

        assert_eq!(round.phase, Phase::Voting);
        assert!(round.votes.is_empty());
        assert_eq!(round.seconds_remaining, 30);
        assert_eq!(round.scenario.unwrap().id, "food-bank-triage");

        let announcements = h.announcer.take();
        assert!(announcements.contains(&Announcement::PhaseChanged {
            phase: Phase::Voting
        }));
        assert!(announcements
            .iter()
            .any(|a| matches!(a, Announcement::ScenarioChanged { index: 0, total: 3, .. })));
    }

    #[tokio::test]
    async fn test_participant_cannot_drive_phases() {
        let h = harness().await;

        let result = h.controller.start_scenario(&Role::Participant).await;
        assert!(matches!(result, Err(SessionError::Unauthorized(_))));
        assert_eq!(h.controller.phase().await, Phase::Waiting);

        h.controller.start_scenario(&Role::Facilitator).await.unwrap();
        let result = h.controller.end_voting(&Role::Participant).await;
        assert!(matches!(result, Err(SessionError::Unauthorized(_))));
        assert_eq!(h.controller.phase().await, Phase::Voting);
    }

    #[tokio::test]
    async fn test_force_results_before_any_vote() {
        let h = harness().await;
        h.controller.start_scenario(&Role::Facilitator).await.unwrap();

        let results = h.controller.end_voting(&Role::Facilitator).await.unwrap();
        assert_eq!(results.tally, VoteTally { pull: 0, dont_pull: 0 });
        assert_eq!(results.decision, Choice::DontPull);
        assert!(results.clouds.pull.is_empty());
        assert_eq!(h.controller.phase().await, Phase::Results);
    }

    #[tokio::test]
    async fn test_second_close_is_noop() {
        let h = harness().await;
        let round = h.controller.start_scenario(&Role::Facilitator).await.unwrap();

        assert!(h.controller.end_voting(&Role::Facilitator).await.is_ok());
        // Timer firing afterwards loses the race
        assert!(h.controller.close_voting(&round.id).await.is_none());
        let result = h.controller.end_voting(&Role::Facilitator).await;
        assert!(matches!(result, Err(SessionError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_cannot_start_twice() {
        let h = harness().await;
        h.controller.start_scenario(&Role::Facilitator).await.unwrap();
        let result = h.controller.start_scenario(&Role::Facilitator).await;
        assert!(matches!(result, Err(SessionError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_concurrent_starts_keep_backend_in_sync() {
        let backend = crate::backend::InMemoryRoomBackend::new(crate::backend::default_scenarios())
            .with_latency(std::time::Duration::from_millis(20));
        let h = harness_with(backend, GameConfig::default()).await;

        let (a, b) = tokio::join!(
            h.controller.start_scenario(&Role::Facilitator),
            h.controller.start_scenario(&Role::Facilitator),
        );
        let started = match (a, b) {
            (Ok(round), Err(SessionError::InvalidTransition(_)))
            | (Err(SessionError::InvalidTransition(_)), Ok(round)) => round,
            other => panic!("Expected exactly one start, got {:?}", other),
        };
        h.controller.cancel_countdown(&started.id);
        assert_eq!(h.controller.current_round().await.id, started.id);

        // The backend accepts votes for the round that won
        let p = join(&h.controller, "fp-1").await;
        let result = h.controller.submit_vote(&p.id, Choice::Pull, "").await.unwrap();
        assert!(matches!(result, crate::state::VoteResult::Recorded(_)));
    }

    #[tokio::test]
    async fn test_next_scenario_resets_round() {
        let h = harness().await;
        let first = h.controller.start_scenario(&Role::Facilitator).await.unwrap();
        let p = join(&h.controller, "fp-1").await;
        h.controller
            .submit_vote(&p.id, Choice::Pull, "")
            .await
            .unwrap();
        h.controller.end_voting(&Role::Facilitator).await.unwrap();

        let phase = h.controller.next_scenario(&Role::Facilitator).await.unwrap();
        assert_eq!(phase, Phase::Waiting);

        let round = h.controller.current_round().await;
        assert_ne!(round.id, first.id);
        assert!(round.votes.is_empty());
        assert!(round.scenario.is_none());
        assert_eq!(h.controller.snapshot().await.scenario_index, 1);
    }

    #[tokio::test]
    async fn test_last_scenario_completes_session() {
        let h = harness().await;
        for _ in 0..3 {
            h.controller.start_scenario(&Role::Facilitator).await.unwrap();
            h.controller.end_voting(&Role::Facilitator).await.unwrap();
            h.controller.next_scenario(&Role::Facilitator).await.unwrap();
        }

        assert_eq!(h.controller.phase().await, Phase::Complete);
        assert!(!h.controller.snapshot().await.can_start);
        let result = h.controller.start_scenario(&Role::Facilitator).await;
        assert!(matches!(result, Err(SessionError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_next_scenario_requires_results() {
        let h = harness().await;
        let result = h.controller.next_scenario(&Role::Facilitator).await;
        assert!(matches!(result, Err(SessionError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_set_voting_seconds() {
        let h = harness().await;
        h.controller
            .set_voting_seconds(&Role::Facilitator, 45)
            .await
            .unwrap();
        let round = h.controller.start_scenario(&Role::Facilitator).await.unwrap();
        assert_eq!(round.seconds_remaining, 45);

        // Not while voting
        let result = h.controller.set_voting_seconds(&Role::Facilitator, 60).await;
        assert!(matches!(result, Err(SessionError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_set_voting_seconds_validates_range() {
        let h = harness().await;
        assert_eq!(
            h.controller.set_voting_seconds(&Role::Facilitator, 0).await,
            Err(SessionError::InvalidTimer(0))
        );
        assert_eq!(
            h.controller.set_voting_seconds(&Role::Participant, 20).await,
            Err(SessionError::Unauthorized("set the timer"))
        );
    }

    #[tokio::test]
    async fn test_start_blocked_while_failed() {
        let h = harness().await;
        h.backend.set_offline(true);

        let result = h.controller.start_scenario(&Role::Facilitator).await;
        assert!(matches!(result, Err(SessionError::NetworkFailure(_))));
        assert_eq!(h.controller.phase().await, Phase::Waiting);

        h.backend.set_offline(false);
        let result = h.controller.start_scenario(&Role::Facilitator).await;
        assert_eq!(result.unwrap_err(), SessionError::SessionUnavailable);

        h.controller.reconnect().await.unwrap();
        assert!(h.controller.start_scenario(&Role::Facilitator).await.is_ok());
    }
}
