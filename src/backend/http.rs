use super::*;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Client for the hosted room service
pub struct HttpRoomBackend {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct StartScenarioRequest<'a> {
    round_id: &'a str,
    scenario_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct VotesResponse {
    votes: Vec<Vote>,
}

impl HttpRoomBackend {
    pub fn new(base_url: String, timeout: Duration) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::ConfigError(e.to_string()))?;

        Ok(Self {
            base_url,
            client,
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send with timeout and map transport failures
    async fn send(&self, request: reqwest::RequestBuilder) -> BackendResult<reqwest::Response> {
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))?
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(self.timeout)
                } else {
                    BackendError::Network(e.to_string())
                }
            })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(BackendError::UnknownRoom(
                response.url().path().to_string(),
            )),
            StatusCode::CONFLICT => Err(BackendError::DuplicateVote),
            status if status.is_server_error() => Err(BackendError::Network(format!(
                "Room service returned status: {}",
                status
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(BackendError::Rejected(format!("{}: {}", status, body.trim())))
            }
        }
    }

    async fn json<T: DeserializeOwned>(response: reqwest::Response) -> BackendResult<T> {
        response
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl RoomBackend for HttpRoomBackend {
    async fn join_room(&self, room_code: &str) -> BackendResult<Participant> {
        let response = self
            .send(self.client.post(self.url(&format!("/rooms/{}/participants", room_code))))
            .await
            .map_err(|e| match e {
                BackendError::UnknownRoom(_) => BackendError::UnknownRoom(room_code.to_string()),
                other => other,
            })?;
        Self::json(response).await
    }

    async fn check_room(&self, room_code: &str) -> BackendResult<()> {
        self.send(self.client.get(self.url(&format!("/rooms/{}", room_code))))
            .await
            .map_err(|e| match e {
                BackendError::UnknownRoom(_) => BackendError::UnknownRoom(room_code.to_string()),
                other => other,
            })?;
        Ok(())
    }

    async fn load_scenarios(&self) -> BackendResult<Vec<Scenario>> {
        let response = self.send(self.client.get(self.url("/scenarios"))).await?;
        let scenarios: Vec<Scenario> = Self::json(response).await?;
        if scenarios.is_empty() {
            return Err(BackendError::NoScenarios);
        }
        Ok(scenarios)
    }

    async fn start_scenario(
        &self,
        room_code: &str,
        round_id: &RoundId,
        scenario_id: &str,
    ) -> BackendResult<()> {
        let body = StartScenarioRequest {
            round_id,
            scenario_id,
        };
        self.send(
            self.client
                .post(self.url(&format!("/rooms/{}/rounds", room_code)))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn submit_vote(
        &self,
        room_code: &str,
        round_id: &RoundId,
        vote: &Vote,
    ) -> BackendResult<()> {
        self.send(
            self.client
                .post(self.url(&format!("/rooms/{}/rounds/{}/votes", room_code, round_id)))
                .json(vote),
        )
        .await?;
        Ok(())
    }

    async fn fetch_votes(&self, room_code: &str, round_id: &RoundId) -> BackendResult<Vec<Vote>> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("/rooms/{}/rounds/{}/votes", room_code, round_id))),
            )
            .await?;
        let body: VotesResponse = Self::json(response).await?;
        Ok(body.votes)
    }

    fn name(&self) -> &str {
        "http"
    }
}
