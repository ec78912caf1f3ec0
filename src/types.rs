use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque ID types for type safety
pub type RoomCode = String;
pub type RoundId = String;
pub type ScenarioId = String;
pub type ParticipantId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Waiting,
    Voting,
    Results,
    /// All scenarios have been played
    Complete,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    Pull,
    DontPull,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Facilitator,
    Participant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub voting_seconds: u32,
    pub vote_cooldown_ms: u64,
    pub max_rationale_chars: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            voting_seconds: 30,
            vote_cooldown_ms: 5_000,
            max_rationale_chars: 80,
        }
    }
}

impl GameConfig {
    /// Load config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let voting_seconds = std::env::var("TROLLEY_VOTING_SECONDS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .filter(|secs| (MIN_VOTING_SECONDS..=MAX_VOTING_SECONDS).contains(secs))
            .unwrap_or(defaults.voting_seconds);

        let vote_cooldown_ms = std::env::var("TROLLEY_VOTE_COOLDOWN_MS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.vote_cooldown_ms);

        let max_rationale_chars = std::env::var("TROLLEY_MAX_RATIONALE_CHARS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_rationale_chars);

        tracing::info!(
            voting_seconds,
            vote_cooldown_ms,
            max_rationale_chars,
            "Game config loaded"
        );

        Self {
            voting_seconds,
            vote_cooldown_ms,
            max_rationale_chars,
        }
    }
}

/// Bounds for the facilitator-set countdown
pub const MIN_VOTING_SECONDS: u32 = 1;
pub const MAX_VOTING_SECONDS: u32 = 600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub id: ScenarioId,
    pub title: String,
    pub context: String,
    pub ai_option: String,
    pub non_ai_option: String,
    #[serde(default)]
    pub content_warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    /// Client fingerprint used as the rate limit key
    #[serde(default)]
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub participant_id: ParticipantId,
    pub choice: Choice,
    /// Moderated rationale, empty when none was given
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub moderated: bool,
    pub ts: String,
}

/// The one live round of a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundState {
    pub id: RoundId,
    pub phase: Phase,
    pub scenario: Option<Scenario>,
    pub votes: HashMap<ParticipantId, Vote>,
    pub seconds_remaining: u32,
}

impl RoundState {
    pub fn waiting() -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            phase: Phase::Waiting,
            scenario: None,
            votes: HashMap::new(),
            seconds_remaining: 0,
        }
    }

    pub fn has_voted(&self, participant_id: &str) -> bool {
        self.votes.contains_key(participant_id)
    }

    pub fn tally(&self) -> VoteTally {
        VoteTally::from_votes(self.votes.values())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteTally {
    pub pull: u32,
    pub dont_pull: u32,
}

impl VoteTally {
    pub fn from_votes<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> Self {
        let mut tally = Self::default();
        for vote in votes {
            match vote.choice {
                Choice::Pull => tally.pull += 1,
                Choice::DontPull => tally.dont_pull += 1,
            }
        }
        tally
    }

    pub fn total(&self) -> u32 {
        self.pull + self.dont_pull
    }

    /// Majority choice. Ties (0-0 included) go to not pulling the lever.
    pub fn decision(&self) -> Choice {
        if self.pull > self.dont_pull {
            Choice::Pull
        } else {
            Choice::DontPull
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ConnectionState {
    /// A backend call is in flight and interaction is disabled
    Loading,
    Connected,
    Failed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(participant: &str, choice: Choice) -> Vote {
        Vote {
            participant_id: participant.to_string(),
            choice,
            rationale: String::new(),
            moderated: false,
            ts: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn test_tally_counts_each_choice() {
        let votes = [
            vote("a", Choice::Pull),
            vote("b", Choice::Pull),
            vote("c", Choice::DontPull),
        ];
        let tally = VoteTally::from_votes(&votes);
        assert_eq!(tally, VoteTally { pull: 2, dont_pull: 1 });
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.decision(), Choice::Pull);
    }

    #[test]
    fn test_tie_goes_to_dont_pull() {
        let tally = VoteTally { pull: 2, dont_pull: 2 };
        assert_eq!(tally.decision(), Choice::DontPull);
        assert_eq!(VoteTally::default().decision(), Choice::DontPull);
    }

    #[test]
    fn test_choice_wire_format() {
        assert_eq!(serde_json::to_string(&Choice::DontPull).unwrap(), "\"dont_pull\"");
        assert_eq!(serde_json::to_string(&Phase::Results).unwrap(), "\"results\"");
        let role: Role = serde_json::from_str("\"facilitator\"").unwrap();
        assert_eq!(role, Role::Facilitator);
    }

    #[test]
    fn test_fresh_round_is_waiting_and_empty() {
        let round = RoundState::waiting();
        assert_eq!(round.phase, Phase::Waiting);
        assert!(round.scenario.is_none());
        assert!(round.votes.is_empty());
        assert_eq!(round.tally(), VoteTally::default());
    }
}
