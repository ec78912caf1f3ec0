//! Facilitator command handlers
//!
//! Authorization is checked in the main dispatch layer before calling these;
//! the controller checks again since it is also a library entry point.

use super::handlers::error_response;
use crate::protocol::ServerMessage;
use crate::state::SessionController;
use crate::types::Role;
use std::sync::Arc;

pub async fn handle_load_scenarios(
    controller: &Arc<SessionController>,
    role: &Role,
) -> Option<ServerMessage> {
    tracing::info!("Facilitator reloading scenarios");
    match controller.load_scenarios(role).await {
        Ok(_) => None,
        Err(e) => Some(error_response(&e)),
    }
}

pub async fn handle_set_timer(
    controller: &Arc<SessionController>,
    role: &Role,
    seconds: u32,
) -> Option<ServerMessage> {
    tracing::info!("Facilitator setting voting timer to {}s", seconds);
    controller
        .set_voting_seconds(role, seconds)
        .await
        .err()
        .map(|e| error_response(&e))
}

pub async fn handle_start_scenario(
    controller: &Arc<SessionController>,
    role: &Role,
) -> Option<ServerMessage> {
    tracing::info!("Facilitator starting scenario");
    match controller.start_scenario(role).await {
        Ok(round) => {
            tracing::debug!(round_id = %round.id, "Scenario started");
            None
        }
        Err(e) => Some(error_response(&e)),
    }
}

pub async fn handle_end_voting(
    controller: &Arc<SessionController>,
    role: &Role,
) -> Option<ServerMessage> {
    tracing::info!("Facilitator ending voting early");
    match controller.end_voting(role).await {
        Ok(results) => {
            tracing::debug!(
                round_id = %results.round_id,
                total = results.tally.total(),
                "Voting ended"
            );
            None
        }
        Err(e) => Some(error_response(&e)),
    }
}

pub async fn handle_next_scenario(
    controller: &Arc<SessionController>,
    role: &Role,
) -> Option<ServerMessage> {
    tracing::info!("Facilitator advancing to next scenario");
    controller
        .next_scenario(role)
        .await
        .err()
        .map(|e| error_response(&e))
}
