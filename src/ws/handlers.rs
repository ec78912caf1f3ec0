//! WebSocket message dispatch
//!
//! Authorization is checked here, then dispatched to role-specific handler
//! modules. State changes reach every client through the broadcast channel,
//! so replies only carry what is private to the sender.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{SessionController, SessionError};
use crate::types::Role;
use std::sync::Arc;

use super::{facilitator, participant, ConnectionContext};

/// Check facilitator authorization and return early if unauthorized
macro_rules! check_facilitator {
    ($role:expr, $action:expr) => {
        if *$role != Role::Facilitator {
            return Some(error_response(&SessionError::Unauthorized($action)));
        }
    };
}

pub fn error_response(e: &SessionError) -> ServerMessage {
    ServerMessage::Error {
        code: e.code().to_string(),
        msg: e.to_string(),
    }
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    role: &Role,
    controller: &Arc<SessionController>,
    conn: &mut ConnectionContext,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Join => participant::handle_join(controller, conn).await,

        ClientMessage::Vote { choice, rationale } => {
            participant::handle_vote(controller, conn, choice, rationale).await
        }

        ClientMessage::Key { key, rationale } => {
            participant::handle_key(controller, conn, key, rationale).await
        }

        ClientMessage::Reconnect => match controller.reconnect().await {
            Ok(()) => None,
            Err(e) => Some(error_response(&e)),
        },

        // Facilitator-only commands
        ClientMessage::LoadScenarios => {
            check_facilitator!(role, "load scenarios");
            facilitator::handle_load_scenarios(controller, role).await
        }

        ClientMessage::SetTimer { seconds } => {
            check_facilitator!(role, "set the timer");
            facilitator::handle_set_timer(controller, role, seconds).await
        }

        ClientMessage::StartScenario => {
            check_facilitator!(role, "start scenarios");
            facilitator::handle_start_scenario(controller, role).await
        }

        ClientMessage::EndVoting => {
            check_facilitator!(role, "end voting");
            facilitator::handle_end_voting(controller, role).await
        }

        ClientMessage::NextScenario => {
            check_facilitator!(role, "advance scenarios");
            facilitator::handle_next_scenario(controller, role).await
        }
    }
}
