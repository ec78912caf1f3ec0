use super::{RoundResults, SessionController, SessionError};
use crate::announce::Announcement;
use crate::backend::BackendError;
use crate::protocol::{RejectReason, ServerMessage};
use crate::types::*;
use crate::wordcloud::{WordClouds, DEFAULT_CLOUD_SIZE};
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Outcome of a vote attempt. Rejections are inline messages, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum VoteResult {
    Recorded(Vote),
    /// Already voted (or a vote is in flight); idempotent no-op
    AlreadyVoted,
    RateLimited { remaining: Duration },
    NotVoting,
    NotJoined,
}

impl VoteResult {
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            VoteResult::Recorded(_) => None,
            VoteResult::AlreadyVoted => Some(RejectReason::AlreadyVoted),
            VoteResult::RateLimited { .. } => Some(RejectReason::RateLimited),
            VoteResult::NotVoting => Some(RejectReason::NotVoting),
            VoteResult::NotJoined => Some(RejectReason::NotJoined),
        }
    }
}

/// Cap a rationale at `max` characters (not bytes)
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl SessionController {
    /// Submit a participant's vote for the live round.
    ///
    /// Order of checks: session connected, voting open, one vote per
    /// participant, client cooldown. The vote only counts once the backend
    /// has acknowledged it.
    pub async fn submit_vote(
        &self,
        participant_id: &str,
        choice: Choice,
        rationale: &str,
    ) -> Result<VoteResult, SessionError> {
        // Failed, or a backend call holds the session in loading
        if !self.accepts_votes().await {
            return Err(SessionError::SessionUnavailable);
        }

        let Some(participant) = self.participant(participant_id).await else {
            return Ok(VoteResult::NotJoined);
        };

        let round_id = {
            let mut session = self.session.write().await;
            if session.round.phase != Phase::Voting {
                return Ok(VoteResult::NotVoting);
            }
            if session.round.has_voted(participant_id)
                || session.pending_votes.contains(participant_id)
            {
                tracing::debug!(participant_id, "Ignoring repeat vote");
                return Ok(VoteResult::AlreadyVoted);
            }

            let remaining = self
                .rate_limiter
                .remaining_time(&participant.fingerprint)
                .await;
            if !remaining.is_zero() {
                tracing::info!(
                    participant_id,
                    remaining_ms = remaining.as_millis() as u64,
                    "Vote rate limited"
                );
                return Ok(VoteResult::RateLimited { remaining });
            }

            session.pending_votes.insert(participant_id.to_string());
            session.round.id.clone()
        };

        let rationale = truncate_chars(rationale.trim(), self.config.max_rationale_chars);
        let (rationale, moderated) = if rationale.is_empty() {
            (String::new(), false)
        } else {
            let result = self.moderator.moderate(rationale);
            if result.moderated {
                tracing::info!(participant_id, "Rationale moderated");
                self.announce_local(Announcement::Moderation);
            }
            (result.sanitized, result.moderated)
        };

        let vote = Vote {
            participant_id: participant_id.to_string(),
            choice,
            rationale,
            moderated,
            ts: chrono::Utc::now().to_rfc3339(),
        };

        let backend_result = self
            .backend
            .submit_vote(&self.room_code, &round_id, &vote)
            .await;

        match backend_result {
            Ok(()) => {
                self.rate_limiter.record(&participant.fingerprint).await;
                self.record_acknowledged_vote(&round_id, vote.clone()).await;
                tracing::info!(participant_id, choice = ?vote.choice, "Vote recorded");
                self.announce_local(Announcement::VoteSubmitted {
                    choice: vote.choice,
                    rationale: vote.rationale.clone(),
                });
                Ok(VoteResult::Recorded(vote))
            }
            Err(BackendError::DuplicateVote) => {
                self.clear_pending(participant_id).await;
                // The backend has this participant's vote; pull it in
                if let Err(e) = self.sync_votes().await {
                    tracing::warn!("Vote sync after duplicate failed: {}", e);
                }
                Ok(VoteResult::AlreadyVoted)
            }
            Err(e) => {
                self.clear_pending(participant_id).await;
                let err = SessionError::from(e);
                tracing::warn!(participant_id, "Vote submission failed: {}", err);
                if err.is_blocking() {
                    self.fail_connection(err.to_string()).await;
                    return Err(err);
                }
                match err {
                    SessionError::Backend(_) => Ok(VoteResult::NotVoting),
                    other => Err(other),
                }
            }
        }
    }

    async fn clear_pending(&self, participant_id: &str) {
        self.session.write().await.pending_votes.remove(participant_id);
    }

    /// Store an acknowledged vote if its round is still the live one
    async fn record_acknowledged_vote(&self, round_id: &RoundId, vote: Vote) {
        let mut session = self.session.write().await;
        session.pending_votes.remove(&vote.participant_id);

        if session.round.id != *round_id {
            tracing::warn!(round_id = %round_id, "Acknowledged vote belongs to a finished round");
            return;
        }

        session
            .round
            .votes
            .entry(vote.participant_id.clone())
            .or_insert(vote);

        let round = session.round.clone();
        drop(session);

        match round.phase {
            // Voting closed while the vote was in flight; results include it
            Phase::Results => self.broadcast_results(&RoundResults::from_round(&round)),
            _ => self.broadcast_vote_counts(&round),
        }
    }

    /// Merge the backend's vote set for the live round, append-only.
    ///
    /// Returns how many votes were new.
    pub async fn sync_votes(&self) -> Result<usize, SessionError> {
        let (round_id, phase) = {
            let session = self.session.read().await;
            (session.round.id.clone(), session.round.phase)
        };
        if phase != Phase::Voting {
            return Ok(0);
        }

        let remote = match self.backend.fetch_votes(&self.room_code, &round_id).await {
            Ok(votes) => votes,
            Err(e) => {
                let err = SessionError::from(e);
                if err.is_blocking() {
                    self.fail_connection(err.to_string()).await;
                }
                return Err(err);
            }
        };

        let mut session = self.session.write().await;
        if session.round.id != round_id || session.round.phase != Phase::Voting {
            return Ok(0);
        }

        let mut added = 0;
        for vote in remote {
            if !session.round.votes.contains_key(&vote.participant_id) {
                session.round.votes.insert(vote.participant_id.clone(), vote);
                added += 1;
            }
        }

        if added > 0 {
            let round = session.round.clone();
            drop(session);
            tracing::debug!(added, "Merged votes from backend");
            self.broadcast_vote_counts(&round);
        }
        Ok(added)
    }

    pub async fn tally(&self) -> VoteTally {
        self.session.read().await.round.tally()
    }

    pub async fn word_clouds(&self) -> WordClouds {
        let session = self.session.read().await;
        WordClouds::from_votes(session.round.votes.values(), DEFAULT_CLOUD_SIZE)
    }

    fn broadcast_vote_counts(&self, round: &RoundState) {
        let seq = self.vote_seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.broadcast_to_all(ServerMessage::VoteCounts {
            round_id: round.id.clone(),
            tally: round.tally(),
            clouds: WordClouds::from_votes(round.votes.values(), DEFAULT_CLOUD_SIZE),
            seq,
        });
    }
}
