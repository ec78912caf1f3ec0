use super::{SessionController, SessionError};
use crate::announce::Announcement;
use crate::protocol::ServerMessage;
use crate::types::*;

impl SessionController {
    /// Initial load: confirm the room, fetch the scenario deck and mark the
    /// session usable
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.set_connection(ConnectionState::Loading).await;

        if let Err(e) = self.backend.check_room(&self.room_code).await {
            let err = SessionError::from(e);
            tracing::warn!(room_code = %self.room_code, "Room check failed: {}", err);
            if err.is_blocking() {
                self.fail_connection(err.to_string()).await;
            } else {
                self.finish_loading().await;
            }
            return Err(err);
        }

        let result = self.refresh_scenarios().await;
        if !matches!(&result, Err(e) if e.is_blocking()) {
            self.finish_loading().await;
        }
        result.map(|_| ())
    }

    /// Manual retry after a join or network failure
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        tracing::info!(room_code = %self.room_code, "Reconnecting session");
        self.connect().await
    }

    /// False once the session has failed; facilitator actions check this
    pub async fn is_available(&self) -> bool {
        !matches!(*self.connection.read().await, ConnectionState::Failed { .. })
    }

    /// Votes are only taken while no backend call holds the session in loading
    pub async fn accepts_votes(&self) -> bool {
        *self.connection.read().await == ConnectionState::Connected
    }

    /// Join the room through the backend and register the participant locally
    pub async fn join(&self, fingerprint: &str) -> Result<Participant, SessionError> {
        match self.backend.join_room(&self.room_code).await {
            Ok(mut participant) => {
                participant.fingerprint = fingerprint.to_string();
                self.participants
                    .write()
                    .await
                    .insert(participant.id.clone(), participant.clone());

                // A successful rejoin clears an earlier failure; a pending
                // load keeps its own state
                if !self.is_available().await {
                    tracing::info!("Rejoin succeeded, session available again");
                    self.set_connection(ConnectionState::Connected).await;
                }

                tracing::info!(
                    participant_id = %participant.id,
                    display_name = %participant.display_name,
                    "Participant joined"
                );
                Ok(participant)
            }
            Err(e) => {
                let err = SessionError::from(e);
                tracing::warn!(room_code = %self.room_code, "Join failed: {}", err);
                if err.is_blocking() {
                    self.fail_connection(err.to_string()).await;
                }
                Err(err)
            }
        }
    }

    pub async fn participant(&self, participant_id: &str) -> Option<Participant> {
        self.participants.read().await.get(participant_id).cloned()
    }

    pub async fn participant_count(&self) -> usize {
        self.participants.read().await.len()
    }

    /// Facilitator reload of the scenario deck
    pub async fn load_scenarios(&self, role: &Role) -> Result<usize, SessionError> {
        Self::require_facilitator(role, "load scenarios")?;
        if !self.is_available().await {
            return Err(SessionError::SessionUnavailable);
        }
        self.refresh_scenarios().await
    }

    /// Fetch scenarios; a failure disables starting instead of touching the live round
    pub(super) async fn refresh_scenarios(&self) -> Result<usize, SessionError> {
        let result = self.backend.load_scenarios().await;

        let (count, can_start, outcome) = {
            let mut session = self.session.write().await;
            match result {
                Ok(scenarios) if !scenarios.is_empty() => {
                    // Swapping the deck mid-round would orphan the scenario index
                    if session.round.phase == Phase::Waiting && session.scenario_index == 0 {
                        session.scenarios = scenarios;
                    } else {
                        tracing::info!("Keeping current deck while a session is under way");
                    }
                    session.can_start = session.round.phase != Phase::Complete
                        && session.scenario_index < session.scenarios.len();
                    (session.scenarios.len(), session.can_start, Ok(session.scenarios.len()))
                }
                Ok(_) => {
                    session.can_start = false;
                    (
                        session.scenarios.len(),
                        false,
                        Err(SessionError::ScenarioLoadFailure(
                            "backend returned no scenarios".to_string(),
                        )),
                    )
                }
                Err(e) => {
                    let err = SessionError::from(e);
                    if session.scenarios.is_empty() {
                        session.can_start = false;
                    }
                    (session.scenarios.len(), session.can_start, Err(err))
                }
            }
        };

        match &outcome {
            Ok(n) => tracing::info!("Loaded {} scenarios", n),
            Err(e) => {
                tracing::warn!("Scenario load failed: {}", e);
                if e.is_blocking() {
                    self.fail_connection(e.to_string()).await;
                }
            }
        }

        self.broadcast_to_all(ServerMessage::Scenarios { count, can_start });
        outcome
    }

    pub(super) async fn set_connection(&self, state: ConnectionState) {
        let mut connection = self.connection.write().await;
        if *connection != state {
            *connection = state.clone();
            drop(connection);
            self.broadcast_to_all(ServerMessage::Connection { state });
        }
    }

    /// End a loading phase; a failure recorded meanwhile is kept
    pub(super) async fn finish_loading(&self) {
        let mut connection = self.connection.write().await;
        if *connection == ConnectionState::Loading {
            *connection = ConnectionState::Connected;
            drop(connection);
            self.broadcast_to_all(ServerMessage::Connection {
                state: ConnectionState::Connected,
            });
        }
    }

    /// Block submissions until reconnect; there is no automatic retry
    pub(super) async fn fail_connection(&self, reason: String) {
        tracing::error!(room_code = %self.room_code, "Session failed: {}", reason);
        self.set_connection(ConnectionState::Failed {
            reason: reason.clone(),
        })
        .await;
        self.announce_room(Announcement::Error { message: reason });
    }
}
