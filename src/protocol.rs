use crate::announce::Announcement;
use crate::keyboard::Key;
use crate::types::*;
use crate::wordcloud::WordClouds;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the room as a participant
    Join,
    Vote {
        choice: Choice,
        #[serde(default)]
        rationale: String,
    },
    /// Keyboard input from the voting view
    Key {
        key: Key,
        #[serde(default)]
        rationale: String,
    },
    /// Retry after a connection failure
    Reconnect,
    // Facilitator-only messages
    LoadScenarios,
    SetTimer {
        seconds: u32,
    },
    StartScenario,
    EndVoting,
    NextScenario,
}

/// Why a vote attempt was not recorded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    RateLimited,
    AlreadyVoted,
    NotVoting,
    NotJoined,
    SessionUnavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        role: Role,
        room_code: RoomCode,
        snapshot: SessionSnapshot,
        server_now: String,
    },
    Joined {
        participant: Participant,
    },
    Phase {
        phase: Phase,
        round_id: RoundId,
        scenario: Option<Scenario>,
        scenario_index: usize,
        scenario_count: usize,
        seconds_remaining: u32,
    },
    Timer {
        round_id: RoundId,
        seconds_remaining: u32,
    },
    VoteAck {
        choice: Choice,
        rationale: String,
        moderated: bool,
    },
    VoteRejected {
        reason: RejectReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
        /// Whole seconds for the "please wait" message, rounded up
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    /// Live tally and word clouds while voting
    VoteCounts {
        round_id: RoundId,
        tally: VoteTally,
        clouds: WordClouds,
        seq: u64,
    },
    Results {
        round_id: RoundId,
        tally: VoteTally,
        decision: Choice,
        clouds: WordClouds,
    },
    Scenarios {
        count: usize,
        can_start: bool,
    },
    TimerSet {
        seconds: u32,
    },
    Connection {
        state: ConnectionState,
    },
    Announce {
        announcement: Announcement,
    },
    Error {
        code: String,
        msg: String,
    },
}

/// Everything a freshly connected client needs to render the room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub round_id: RoundId,
    pub scenario: Option<Scenario>,
    pub scenario_index: usize,
    pub scenario_count: usize,
    pub seconds_remaining: u32,
    pub voting_seconds: u32,
    pub tally: VoteTally,
    pub connection: ConnectionState,
    /// False when scenarios failed to load
    pub can_start: bool,
}
