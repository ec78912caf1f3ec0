use super::*;
use rand::Rng;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Safe character set for room codes (excludes 0/O, 1/I/L to avoid confusion)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 6;

/// Generate a random room code
pub fn generate_room_code() -> RoomCode {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

#[derive(Debug, Default)]
struct RoomRecord {
    participants: HashMap<String, Participant>,
    /// Round currently open for votes
    current_round: Option<RoundId>,
    votes: HashMap<RoundId, HashMap<String, Vote>>,
}

/// Process-local stand-in for the hosted backend.
///
/// Serializes all writes behind one lock, which gives the same
/// at-most-one-vote guarantee the hosted service provides.
pub struct InMemoryRoomBackend {
    scenarios: Vec<Scenario>,
    rooms: Arc<RwLock<HashMap<RoomCode, RoomRecord>>>,
    /// When set, every call fails like an unreachable network
    offline: AtomicBool,
    latency: Option<Duration>,
}

impl InMemoryRoomBackend {
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        Self {
            scenarios,
            rooms: Arc::new(RwLock::new(HashMap::new())),
            offline: AtomicBool::new(false),
            latency: None,
        }
    }

    /// Delay every call, like a round trip to the hosted service
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn create_room(&self, room_code: &str) {
        self.rooms
            .write()
            .await
            .entry(room_code.to_string())
            .or_default();
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub async fn participant_count(&self, room_code: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(room_code)
            .map(|r| r.participants.len())
            .unwrap_or(0)
    }

    async fn round_trip(&self) -> BackendResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Network("backend unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RoomBackend for InMemoryRoomBackend {
    async fn join_room(&self, room_code: &str) -> BackendResult<Participant> {
        self.round_trip().await?;

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(room_code)
            .ok_or_else(|| BackendError::UnknownRoom(room_code.to_string()))?;

        let display_name = petname::petname(2, " ")
            .unwrap_or_else(|| format!("Participant {}", room.participants.len() + 1));
        let participant = Participant {
            id: ulid::Ulid::new().to_string(),
            display_name,
            fingerprint: String::new(),
        };
        room.participants
            .insert(participant.id.clone(), participant.clone());

        tracing::debug!(room_code, participant_id = %participant.id, "Participant joined");
        Ok(participant)
    }

    async fn check_room(&self, room_code: &str) -> BackendResult<()> {
        self.round_trip().await?;
        if self.rooms.read().await.contains_key(room_code) {
            Ok(())
        } else {
            Err(BackendError::UnknownRoom(room_code.to_string()))
        }
    }

    async fn load_scenarios(&self) -> BackendResult<Vec<Scenario>> {
        self.round_trip().await?;
        if self.scenarios.is_empty() {
            return Err(BackendError::NoScenarios);
        }
        Ok(self.scenarios.clone())
    }

    async fn start_scenario(
        &self,
        room_code: &str,
        round_id: &RoundId,
        scenario_id: &str,
    ) -> BackendResult<()> {
        self.round_trip().await?;

        if !self.scenarios.iter().any(|s| s.id == scenario_id) {
            return Err(BackendError::Rejected(format!(
                "Scenario {} not found",
                scenario_id
            )));
        }

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(room_code)
            .ok_or_else(|| BackendError::UnknownRoom(room_code.to_string()))?;
        room.current_round = Some(round_id.clone());
        room.votes.entry(round_id.clone()).or_default();
        Ok(())
    }

    async fn submit_vote(
        &self,
        room_code: &str,
        round_id: &RoundId,
        vote: &Vote,
    ) -> BackendResult<()> {
        self.round_trip().await?;

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(room_code)
            .ok_or_else(|| BackendError::UnknownRoom(room_code.to_string()))?;

        if room.current_round.as_ref() != Some(round_id) {
            return Err(BackendError::Rejected("Round is not open".to_string()));
        }

        let round_votes = room.votes.entry(round_id.clone()).or_default();
        if round_votes.contains_key(&vote.participant_id) {
            return Err(BackendError::DuplicateVote);
        }
        round_votes.insert(vote.participant_id.clone(), vote.clone());
        Ok(())
    }

    async fn fetch_votes(&self, room_code: &str, round_id: &RoundId) -> BackendResult<Vec<Vote>> {
        self.round_trip().await?;

        let rooms = self.rooms.read().await;
        let room = rooms
            .get(room_code)
            .ok_or_else(|| BackendError::UnknownRoom(room_code.to_string()))?;
        Ok(room
            .votes
            .get(round_id)
            .map(|votes| votes.values().cloned().collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Read scenarios from a JSON array file
pub fn load_scenarios_file(path: &Path) -> BackendResult<Vec<Scenario>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        BackendError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
    })?;
    let scenarios: Vec<Scenario> =
        serde_json::from_str(&raw).map_err(|e| BackendError::ParseError(e.to_string()))?;
    tracing::info!("Loaded {} scenarios from {}", scenarios.len(), path.display());
    Ok(scenarios)
}

fn scenario(
    id: &str,
    title: &str,
    context: &str,
    ai_option: &str,
    non_ai_option: &str,
    content_warnings: &[&str],
) -> Scenario {
    Scenario {
        id: id.to_string(),
        title: title.to_string(),
        context: context.to_string(),
        ai_option: ai_option.to_string(),
        non_ai_option: non_ai_option.to_string(),
        content_warnings: content_warnings.iter().map(|w| w.to_string()).collect(),
    }
}

/// Built-in scenario deck
pub fn default_scenarios() -> Vec<Scenario> {
    vec![
        scenario(
            "food-bank-triage",
            "Food Bank Triage",
            "Demand at your food bank has doubled. An AI model can rank applicants by need \
             within minutes, but it was trained on data from a different region.",
            "Let the model rank applicants so more families are served this week.",
            "Keep volunteer case reviews, serving fewer families but with human judgment.",
            &["food insecurity"],
        ),
        scenario(
            "crisis-line-chatbot",
            "Crisis Line Overflow",
            "Your crisis line misses one in four calls at night. A chatbot could answer every \
             overflow call immediately and escalate emergencies.",
            "Deploy the chatbot for overflow calls.",
            "Keep a waitlist and recruit more night volunteers.",
            &["mental health", "self-harm"],
        ),
        scenario(
            "donor-targeting",
            "Donor Targeting",
            "A fundraising tool predicts which lapsed donors will give again using purchased \
             consumer data. It would likely close this year's budget gap.",
            "Use the predictions for the year-end campaign.",
            "Run the campaign without third-party data.",
            &[],
        ),
    ]
}
