//! Participant message handlers
//!
//! Joining, voting by click or keyboard. Vote outcomes are private to the
//! voter; the updated tally reaches everyone through the broadcast channel.

use super::handlers::error_response;
use super::ConnectionContext;
use crate::keyboard::{Key, KeyAction};
use crate::protocol::{RejectReason, ServerMessage};
use crate::ratelimit::wait_seconds;
use crate::state::{SessionController, SessionError, VoteResult};
use crate::types::{Choice, Phase};
use std::sync::Arc;
use std::time::Duration;

pub async fn handle_join(
    controller: &Arc<SessionController>,
    conn: &mut ConnectionContext,
) -> Option<ServerMessage> {
    // Rejoining on the same socket keeps the existing identity
    if let Some(participant) = &conn.participant {
        return Some(ServerMessage::Joined {
            participant: participant.clone(),
        });
    }

    match controller.join(&conn.fingerprint).await {
        Ok(participant) => {
            conn.participant = Some(participant.clone());
            Some(ServerMessage::Joined { participant })
        }
        Err(e) => Some(error_response(&e)),
    }
}

pub async fn handle_vote(
    controller: &Arc<SessionController>,
    conn: &mut ConnectionContext,
    choice: Choice,
    rationale: String,
) -> Option<ServerMessage> {
    let Some(participant) = &conn.participant else {
        return Some(rejected(RejectReason::NotJoined, None));
    };

    match controller
        .submit_vote(&participant.id, choice, &rationale)
        .await
    {
        Ok(VoteResult::Recorded(vote)) => Some(ServerMessage::VoteAck {
            choice: vote.choice,
            rationale: vote.rationale,
            moderated: vote.moderated,
        }),
        Ok(VoteResult::RateLimited { remaining }) => {
            Some(rejected(RejectReason::RateLimited, Some(remaining)))
        }
        Ok(other) => other.reject_reason().map(|reason| rejected(reason, None)),
        Err(SessionError::SessionUnavailable) => {
            Some(rejected(RejectReason::SessionUnavailable, None))
        }
        Err(e) => Some(error_response(&e)),
    }
}

/// Keyboard voting: arrows pick a side, Enter/Space submit
pub async fn handle_key(
    controller: &Arc<SessionController>,
    conn: &mut ConnectionContext,
    key: Key,
    rationale: String,
) -> Option<ServerMessage> {
    let round = controller.current_round().await;
    if conn.keyboard_round != round.id {
        conn.keyboard.reset();
        conn.keyboard_round = round.id.clone();
    }

    let can_vote = round.phase == Phase::Voting
        && conn
            .participant
            .as_ref()
            .is_some_and(|p| !round.has_voted(&p.id));

    match conn.keyboard.handle(key, can_vote) {
        KeyAction::Submit(choice) => handle_vote(controller, conn, choice, rationale).await,
        action => {
            tracing::trace!("Keyboard action: {:?}", action);
            None
        }
    }
}

fn rejected(reason: RejectReason, retry_after: Option<Duration>) -> ServerMessage {
    ServerMessage::VoteRejected {
        reason,
        retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
        retry_after_secs: retry_after.map(wait_seconds),
    }
}
