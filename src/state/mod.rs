mod game;
mod room;
mod timer;
mod vote;

pub use game::RoundResults;
pub use timer::TickOutcome;
pub use vote::VoteResult;

use crate::announce::{Announcement, Announcer, TracingAnnouncer};
use crate::backend::{BackendError, RoomBackend};
use crate::moderation::TextModerator;
use crate::protocol::{ServerMessage, SessionSnapshot};
use crate::ratelimit::RateLimiter;
use crate::types::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

/// Errors surfaced by session operations
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SessionError {
    #[error("Could not join room: {0}")]
    JoinFailure(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("No scenarios available: {0}")]
    ScenarioLoadFailure(String),

    #[error("Only the facilitator can {0}")]
    Unauthorized(&'static str),

    #[error("Invalid phase transition: {0}")]
    InvalidTransition(String),

    #[error("Timer must be between 1 and 600 seconds, got {0}")]
    InvalidTimer(u32),

    #[error("Session unavailable until reconnect")]
    SessionUnavailable,

    #[error("Backend rejected request: {0}")]
    Backend(String),
}

impl SessionError {
    /// Wire error code
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::JoinFailure(_) => "JOIN_FAILED",
            SessionError::NetworkFailure(_) => "NETWORK_FAILURE",
            SessionError::ScenarioLoadFailure(_) => "SCENARIO_LOAD_FAILED",
            SessionError::Unauthorized(_) => "UNAUTHORIZED",
            SessionError::InvalidTransition(_) => "INVALID_TRANSITION",
            SessionError::InvalidTimer(_) => "INVALID_TIMER",
            SessionError::SessionUnavailable => "SESSION_UNAVAILABLE",
            SessionError::Backend(_) => "BACKEND_REJECTED",
        }
    }

    /// Whether this error puts the whole session into the failed state
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            SessionError::JoinFailure(_) | SessionError::NetworkFailure(_)
        )
    }
}

impl From<BackendError> for SessionError {
    fn from(e: BackendError) -> Self {
        if e.is_transient() {
            return SessionError::NetworkFailure(e.to_string());
        }
        match e {
            BackendError::UnknownRoom(code) => SessionError::JoinFailure(format!("unknown room {}", code)),
            BackendError::NoScenarios => SessionError::ScenarioLoadFailure(e.to_string()),
            other => SessionError::Backend(other.to_string()),
        }
    }
}

/// Round progression state, guarded by one lock so transitions are atomic
#[derive(Debug)]
pub struct SessionState {
    pub round: RoundState,
    pub scenarios: Vec<Scenario>,
    pub scenario_index: usize,
    pub voting_seconds: u32,
    /// False when the scenario deck could not be loaded
    pub can_start: bool,
    /// Participants whose vote is in flight to the backend
    pub pending_votes: HashSet<ParticipantId>,
    /// A scenario start is waiting on the backend
    pub start_pending: bool,
}

/// Voting session for one room.
///
/// Owns the live round; facilitator and participant actions both go
/// through it and observers follow along via `subscribe()`.
#[derive(Clone)]
pub struct SessionController {
    pub room_code: RoomCode,
    pub config: GameConfig,
    pub session: Arc<RwLock<SessionState>>,
    pub participants: Arc<RwLock<HashMap<ParticipantId, Participant>>>,
    pub connection: Arc<RwLock<ConnectionState>>,
    pub rate_limiter: RateLimiter,
    pub moderator: TextModerator,
    pub backend: Arc<dyn RoomBackend>,
    pub announcer: Arc<dyn Announcer>,
    /// Broadcast channel for room-wide events
    pub broadcast: broadcast::Sender<ServerMessage>,
    countdown: Arc<std::sync::Mutex<Option<timer::Countdown>>>,
    vote_seq: Arc<AtomicU64>,
}

impl SessionController {
    pub fn new(room_code: impl Into<RoomCode>, backend: Arc<dyn RoomBackend>, config: GameConfig) -> Self {
        let (tx, _rx) = broadcast::channel(100);
        let session = SessionState {
            round: RoundState::waiting(),
            scenarios: Vec::new(),
            scenario_index: 0,
            voting_seconds: config.voting_seconds,
            can_start: false,
            pending_votes: HashSet::new(),
            start_pending: false,
        };

        Self {
            room_code: room_code.into(),
            rate_limiter: RateLimiter::new(Duration::from_millis(config.vote_cooldown_ms)),
            config,
            session: Arc::new(RwLock::new(session)),
            participants: Arc::new(RwLock::new(HashMap::new())),
            connection: Arc::new(RwLock::new(ConnectionState::Loading)),
            moderator: TextModerator::default(),
            backend,
            announcer: Arc::new(TracingAnnouncer),
            broadcast: tx,
            countdown: Arc::new(std::sync::Mutex::new(None)),
            vote_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_announcer(mut self, announcer: Arc<dyn Announcer>) -> Self {
        self.announcer = announcer;
        self
    }

    pub fn with_moderator(mut self, moderator: TextModerator) -> Self {
        self.moderator = moderator;
        self
    }

    /// Observe room-wide events
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.broadcast.subscribe()
    }

    /// Send to all subscribers (no receivers connected is fine)
    pub fn broadcast_to_all(&self, msg: ServerMessage) {
        let _ = self.broadcast.send(msg);
    }

    /// Announce to this room's screen readers
    fn announce_room(&self, announcement: Announcement) {
        self.announcer.announce(announcement.clone());
        self.broadcast_to_all(ServerMessage::Announce { announcement });
    }

    /// Announce to the acting client only (the caller relays the reply)
    fn announce_local(&self, announcement: Announcement) {
        self.announcer.announce(announcement);
    }

    fn require_facilitator(role: &Role, action: &'static str) -> Result<(), SessionError> {
        if *role != Role::Facilitator {
            return Err(SessionError::Unauthorized(action));
        }
        Ok(())
    }

    pub async fn phase(&self) -> Phase {
        self.session.read().await.round.phase
    }

    /// Copy of the live round
    pub async fn current_round(&self) -> RoundState {
        self.session.read().await.round.clone()
    }

    pub async fn has_voted(&self, participant_id: &str) -> bool {
        self.session.read().await.round.has_voted(participant_id)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let connection = self.connection.read().await.clone();
        let session = self.session.read().await;
        SessionSnapshot {
            phase: session.round.phase,
            round_id: session.round.id.clone(),
            scenario: session.round.scenario.clone(),
            scenario_index: session.scenario_index,
            scenario_count: session.scenarios.len(),
            seconds_remaining: session.round.seconds_remaining,
            voting_seconds: session.voting_seconds,
            tally: session.round.tally(),
            connection,
            can_start: session.can_start,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::announce::RecordingAnnouncer;
    use crate::backend::{default_scenarios, InMemoryRoomBackend};

    pub const ROOM: &str = "TEST42";

    pub struct Harness {
        pub controller: Arc<SessionController>,
        pub backend: Arc<InMemoryRoomBackend>,
        pub announcer: Arc<RecordingAnnouncer>,
    }

    pub async fn harness() -> Harness {
        harness_with(InMemoryRoomBackend::new(default_scenarios()), GameConfig::default()).await
    }

    pub async fn harness_with(backend: InMemoryRoomBackend, config: GameConfig) -> Harness {
        backend.create_room(ROOM).await;
        let backend = Arc::new(backend);
        let announcer = Arc::new(RecordingAnnouncer::new());
        let controller = SessionController::new(ROOM, backend.clone(), config)
            .with_announcer(announcer.clone());
        let controller = Arc::new(controller);
        let _ = controller.connect().await;
        Harness {
            controller,
            backend,
            announcer,
        }
    }

    /// Join a participant with its own fingerprint
    pub async fn join(controller: &SessionController, fingerprint: &str) -> Participant {
        controller.join(fingerprint).await.unwrap()
    }
}
