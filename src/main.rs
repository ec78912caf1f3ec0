use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trolleyvote::{
    backend::BackendConfig, broadcast, moderation::TextModerator, state::SessionController,
    types::GameConfig, ws,
};

/// Default listen port
const DEFAULT_PORT: u16 = 6573;

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trolleyvote=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting trolley vote session...");

    let config = GameConfig::from_env();

    let backend_config = BackendConfig::from_env();
    let (backend, room_code) = match backend_config.build_backend().await {
        Ok(built) => built,
        Err(e) => {
            tracing::error!("Failed to initialize room backend: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "Using {} backend for room {}",
        backend.name(),
        room_code
    );

    let controller = Arc::new(
        SessionController::new(room_code, backend, config).with_moderator(TextModerator::from_env()),
    );

    // A failed first load leaves the session waiting for a manual reconnect
    if let Err(e) = controller.connect().await {
        tracing::warn!("Initial session load failed: {}", e);
    }

    // Spawn background task for pulling votes cast through other clients
    broadcast::spawn_vote_sync(controller.clone());

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(controller);

    let port = std::env::var("TROLLEY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
