pub mod facilitator;
pub mod handlers;
pub mod participant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap},
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::keyboard::KeyboardNavigator;
use crate::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::ratelimit::client_fingerprint;
use crate::state::SessionController;
use crate::types::{Participant, Role, RoundId};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub role: Option<String>,
}

/// Per-socket state that outlives individual messages
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    /// Rate-limit identity derived from the client, not the participant
    pub fingerprint: String,
    pub participant: Option<Participant>,
    pub keyboard: KeyboardNavigator,
    /// Round the keyboard selection belongs to
    pub keyboard_round: RoundId,
}

impl ConnectionContext {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            participant: None,
            keyboard: KeyboardNavigator::default(),
            keyboard_round: RoundId::new(),
        }
    }
}

fn parse_role(role: Option<&str>) -> Role {
    match role {
        Some("facilitator") | Some("host") => Role::Facilitator,
        _ => Role::Participant,
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    headers: HeaderMap,
    State(controller): State<Arc<SessionController>>,
) -> impl IntoResponse {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let role = parse_role(params.role.as_deref());
    tracing::info!("WebSocket connection request: role={:?}", role);

    ws.on_upgrade(move |socket| handle_socket(socket, role, user_agent, controller))
}

async fn send_json(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            true
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    role: Role,
    user_agent: String,
    controller: Arc<SessionController>,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut conn = ConnectionContext::new(client_fingerprint(&user_agent, &controller.room_code));

    tracing::info!("WebSocket connected with role: {:?}", role);

    // Subscribe before the snapshot so no event falls in between
    let mut broadcast_rx = controller.subscribe();

    let welcome = ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        role: role.clone(),
        room_code: controller.room_code.clone(),
        snapshot: controller.snapshot().await,
        server_now: chrono::Utc::now().to_rfc3339(),
    };
    if !send_json(&mut sender, &welcome).await {
        tracing::error!("Failed to send welcome message");
        return;
    }

    loop {
        tokio::select! {
            broadcast_msg = broadcast_rx.recv() => {
                match broadcast_msg {
                    Ok(msg) => {
                        if !send_json(&mut sender, &msg).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Client lagged, skipped {} events", skipped);
                        // Resync with a fresh snapshot
                        let welcome = ServerMessage::Welcome {
                            protocol: PROTOCOL_VERSION.to_string(),
                            role: role.clone(),
                            room_code: controller.room_code.clone(),
                            snapshot: controller.snapshot().await,
                            server_now: chrono::Utc::now().to_rfc3339(),
                        };
                        if !send_json(&mut sender, &welcome).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handlers::handle_message(client_msg, &role, &controller, &mut conn).await
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                Some(ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                })
                            }
                        };

                        if let Some(response) = response {
                            if !send_json(&mut sender, &response).await {
                                tracing::error!("Failed to send response");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!("WebSocket connection closed for role: {:?}", role);
}
