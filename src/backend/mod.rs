mod http;
mod memory;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::types::{Participant, RoomCode, RoundId, Scenario, Vote};

pub use http::HttpRoomBackend;
pub use memory::{default_scenarios, generate_room_code, load_scenarios_file, InMemoryRoomBackend};

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur talking to the room backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Unknown room: {0}")]
    UnknownRoom(String),

    #[error("Participant already voted this round")]
    DuplicateVote,

    #[error("Request failed: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("No scenarios available")]
    NoScenarios,

    #[error("Backend rejected request: {0}")]
    Rejected(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl BackendError {
    /// Whether the outcome of the request is unknown (connection trouble)
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Network(_) | BackendError::Timeout(_))
    }
}

/// The managed real-time service that owns rooms, votes and fan-out.
///
/// Implementations must accept at most one vote per participant per round
/// and never replace a vote once accepted.
#[async_trait]
pub trait RoomBackend: Send + Sync {
    /// Join a room, returning the backend's participant record
    async fn join_room(&self, room_code: &str) -> BackendResult<Participant>;

    /// Confirm the room exists (`UnknownRoom` otherwise)
    async fn check_room(&self, room_code: &str) -> BackendResult<()>;

    async fn load_scenarios(&self) -> BackendResult<Vec<Scenario>>;

    /// Tell the room which scenario is now being voted on
    async fn start_scenario(
        &self,
        room_code: &str,
        round_id: &RoundId,
        scenario_id: &str,
    ) -> BackendResult<()>;

    async fn submit_vote(&self, room_code: &str, round_id: &RoundId, vote: &Vote)
        -> BackendResult<()>;

    /// Aggregate vote set for a round as currently visible to room members
    async fn fetch_votes(&self, room_code: &str, round_id: &RoundId) -> BackendResult<Vec<Vote>>;

    /// Get the name of this backend
    fn name(&self) -> &str;
}

/// Configuration for the room backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the hosted backend (None = in-memory)
    pub url: Option<String>,
    /// Timeout for backend requests
    pub timeout: Duration,
    /// JSON file with scenarios for the in-memory backend
    pub scenarios_path: Option<PathBuf>,
    /// Room to host (None = generate one)
    pub room_code: Option<RoomCode>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(10),
            scenarios_path: None,
            room_code: None,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl BackendConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            url: non_empty_var("TROLLEY_BACKEND_URL").map(|u| u.trim_end_matches('/').to_string()),
            timeout: std::env::var("TROLLEY_BACKEND_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(10)),
            scenarios_path: non_empty_var("TROLLEY_SCENARIOS_PATH").map(PathBuf::from),
            room_code: non_empty_var("TROLLEY_ROOM_CODE").map(|c| c.to_uppercase()),
        }
    }

    /// Build the configured backend and the room code it will serve.
    ///
    /// The in-memory backend creates the room itself; a hosted backend
    /// must already know the room.
    pub async fn build_backend(&self) -> BackendResult<(Arc<dyn RoomBackend>, RoomCode)> {
        if let Some(url) = &self.url {
            let room_code = self.room_code.clone().ok_or_else(|| {
                BackendError::ConfigError(
                    "TROLLEY_ROOM_CODE is required with TROLLEY_BACKEND_URL".to_string(),
                )
            })?;
            tracing::info!(%url, %room_code, "Using hosted room backend");
            return Ok((
                Arc::new(HttpRoomBackend::new(url.clone(), self.timeout)?),
                room_code,
            ));
        }

        let scenarios = match &self.scenarios_path {
            Some(path) => load_scenarios_file(path)?,
            None => default_scenarios(),
        };
        let backend = InMemoryRoomBackend::new(scenarios);
        let room_code = self.room_code.clone().unwrap_or_else(generate_room_code);
        backend.create_room(&room_code).await;
        tracing::info!(%room_code, "Using in-memory room backend");
        Ok((Arc::new(backend), room_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = BackendConfig::default();
        assert!(config.url.is_none());
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("TROLLEY_BACKEND_URL", "https://rooms.example.org/");
        std::env::set_var("TROLLEY_ROOM_CODE", "abc123");
        std::env::set_var("TROLLEY_BACKEND_TIMEOUT", "3");

        let config = BackendConfig::from_env();
        assert_eq!(config.url.as_deref(), Some("https://rooms.example.org"));
        assert_eq!(config.room_code.as_deref(), Some("ABC123"));
        assert_eq!(config.timeout, Duration::from_secs(3));

        std::env::remove_var("TROLLEY_BACKEND_URL");
        std::env::remove_var("TROLLEY_ROOM_CODE");
        std::env::remove_var("TROLLEY_BACKEND_TIMEOUT");
    }

    #[tokio::test]
    #[serial]
    async fn test_build_in_memory_backend() {
        let config = BackendConfig {
            room_code: Some("ROOM42".to_string()),
            ..Default::default()
        };
        let (backend, room_code) = config.build_backend().await.unwrap();
        assert_eq!(room_code, "ROOM42");
        assert_eq!(backend.name(), "memory");
        assert!(backend.join_room("ROOM42").await.is_ok());
    }

    #[tokio::test]
    async fn test_hosted_backend_requires_room_code() {
        let config = BackendConfig {
            url: Some("http://localhost:9".to_string()),
            ..Default::default()
        };
        let result = config.build_backend().await;
        assert!(matches!(result, Err(BackendError::ConfigError(_))));
    }

    #[test]
    fn test_transient_errors() {
        assert!(BackendError::Network("reset".to_string()).is_transient());
        assert!(BackendError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!BackendError::DuplicateVote.is_transient());
        assert!(!BackendError::UnknownRoom("X".to_string()).is_transient());
    }
}
