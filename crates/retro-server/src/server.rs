use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use retro_core::ids::RetroId;
use retro_core::model::DEFAULT_RETRO_NAME;
use retro_store::retros::RetroRepo;
use retro_store::Database;

use crate::client::{self, ClientRegistry};
use crate::router::RoomRouter;

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8787,
            max_send_queue: 256,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub registry: Arc<ClientRegistry>,
    pub router: Arc<RoomRouter>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/retros", post(create_retro_handler))
        .route("/api/retro/{retro_id}", get(lookup_retro_handler))
        .route("/api/retro/{retro_id}/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(config: ServerConfig, db: Database) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ClientRegistry::new(config.max_send_queue));

    // Dead-client sweep (every 60s)
    let _cleanup = client::start_cleanup_task(
        Arc::clone(&registry),
        std::time::Duration::from_secs(60),
    );

    let router = RoomRouter::new(db.clone(), Arc::clone(&registry));

    let state = AppState {
        db,
        registry,
        router,
    };

    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "retro server started");

    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server,
        _cleanup,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

#[derive(Debug, Default, Deserialize)]
struct CreateRetroBody {
    name: Option<String>,
}

/// POST /api/retros — the front door creates the session row before any
/// connection exists.
async fn create_retro_handler(
    State(state): State<AppState>,
    body: Option<Json<CreateRetroBody>>,
) -> impl IntoResponse {
    let name = body
        .and_then(|Json(body)| body.name)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_RETRO_NAME.to_string());

    let repo = RetroRepo::new(state.db.clone());
    match repo.create(&RetroId::new(), &name) {
        Ok(retro) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": retro.id, "name": retro.name })),
        )
            .into_response(),
        Err(error) => {
            tracing::error!(%error, "failed to create retro");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "failed to create retro" })),
            )
                .into_response()
        }
    }
}

/// GET /api/retro/{id} — existence check used by the join page.
async fn lookup_retro_handler(
    State(state): State<AppState>,
    Path(retro_id): Path<String>,
) -> impl IntoResponse {
    let repo = RetroRepo::new(state.db.clone());
    match repo.find(&RetroId::from_raw(retro_id)) {
        Ok(Some(retro)) => {
            Json(serde_json::json!({ "exists": true, "name": retro.name })).into_response()
        }
        Ok(None) => Json(serde_json::json!({ "exists": false })).into_response(),
        Err(error) => {
            tracing::error!(%error, "retro lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "lookup failed" })),
            )
                .into_response()
        }
    }
}

/// GET /api/retro/{id}/ws — WebSocket upgrade into the room.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(retro_id): Path<String>,
) -> impl IntoResponse {
    let retro_id = RetroId::from_raw(retro_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, retro_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, retro_id: RetroId) {
    let room_tx = state.router.sender(&retro_id);
    let (client_id, rx) = state.registry.register(retro_id.clone());
    tracing::info!(retro_id = %retro_id, client_id = %client_id, "websocket client connected");

    client::handle_ws_connection(socket, client_id, rx, state.registry, room_tx).await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = state
        .db
        .with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(retro_store::StoreError::from)
        })
        .is_ok();

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = serde_json::json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "connections": state.registry.count(),
        "rooms": state.router.active_rooms(),
    });

    (status, Json(body))
}
