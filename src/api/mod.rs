//! Admin HTTP surface
//!
//! Serves the remapping page (a plain HTML form posting to `/update`) plus a
//! small JSON API and a WebSocket that pushes every committed mapping change.
//! Default port: 5000

mod page;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Form, Path, Query, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::admin::{AdminMutator, AppliedUpdate, UpdateResult};
use crate::button::ButtonId;
use crate::gpio::SimulatedPins;
use crate::mapping::MappingSnapshot;

/// Default API port
pub const DEFAULT_API_PORT: u16 = 5000;

/// Longest simulated hold accepted by `/api/simulate`
const MAX_HOLD_MS: u64 = 10_000;

/// Shared state for API handlers
pub struct ApiState {
    /// Writes into the mapping store
    pub admin: AdminMutator,
    /// Virtual button lines, when the simulated GPIO backend is active
    pub simulator: Option<SimulatedPins>,
    /// Broadcast channel for mapping updates
    pub update_tx: broadcast::Sender<MappingUpdate>,
}

impl ApiState {
    pub fn new(admin: AdminMutator, simulator: Option<SimulatedPins>) -> Self {
        let (update_tx, _) = broadcast::channel(64);
        Self {
            admin,
            simulator,
            update_tx,
        }
    }

    /// Best-effort broadcast (ignored if no subscribers)
    fn publish(&self, update: &AppliedUpdate) {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let _ = self.update_tx.send(MappingUpdate {
            button: update.button,
            hex: update.hex.to_hex(),
            revision: update.revision,
            timestamp,
        });
    }

    /// Run the mutator and broadcast on success
    fn apply(&self, button_name: &str, hex_text: &str) -> UpdateResult {
        let result = self.admin.handle_update(button_name, hex_text);
        if let UpdateResult::Updated {
            button,
            ref message,
            revision,
        } = result
        {
            self.publish(&AppliedUpdate {
                button,
                hex: message.clone(),
                revision,
            });
        }
        result
    }
}

/// Mapping update notification (sent via WebSocket)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingUpdate {
    pub button: ButtonId,
    pub hex: String,
    pub revision: u64,
    pub timestamp: u64,
}

/// Admin form fields (`application/x-www-form-urlencoded`)
#[derive(Debug, Deserialize)]
pub struct UpdateForm {
    pub button: Option<String>,
    pub hex_value: Option<String>,
}

/// Request body for setting a mapping entry
#[derive(Debug, Deserialize)]
pub struct SetMappingRequest {
    pub hex: String,
}

/// Query for a simulated press
#[derive(Debug, Deserialize)]
pub struct SimulateParams {
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
}

fn default_hold_ms() -> u64 {
    100
}

/// API error response
#[derive(Debug, Serialize)]
struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Build the API router
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/update", post(update_form))
        .route("/api/mapping", get(get_mapping))
        .route("/api/mapping/:button", get(get_mapping_entry).put(set_mapping_entry))
        .route("/api/ws/mapping-updates", get(mapping_updates_ws))
        .route("/api/simulate/:button", post(simulate_press))
        .route("/api/health", get(health_check))
        .with_state(state)
}

/// GET / - Admin page
async fn index(State(state): State<Arc<ApiState>>) -> Html<String> {
    Html(page::render(&state.admin.current(), None, state.simulator.is_some()))
}

/// POST /update - Admin form submission
async fn update_form(
    State(state): State<Arc<ApiState>>,
    Form(form): Form<UpdateForm>,
) -> (StatusCode, Html<String>) {
    let button = form.button.unwrap_or_default();
    let hex_value = form.hex_value.unwrap_or_default();

    let result = state.apply(&button, &hex_value);
    let status = match result {
        UpdateResult::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    };

    let notice = page::Notice {
        ok: result.is_updated(),
        text: result.display_message(),
    };
    (
        status,
        Html(page::render(&state.admin.current(), Some(&notice), state.simulator.is_some())),
    )
}

/// GET /api/mapping - Whole mapping
async fn get_mapping(State(state): State<Arc<ApiState>>) -> Json<MappingSnapshot> {
    Json(state.admin.current())
}

/// GET /api/mapping/:button - One entry
async fn get_mapping_entry(
    Path(button): Path<String>,
    State(state): State<Arc<ApiState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let button = button
        .parse::<ButtonId>()
        .map_err(|e| ApiError::new(StatusCode::NOT_FOUND, e.to_string()))?;
    let snapshot = state.admin.current();

    Ok(Json(serde_json::json!({
        "button": button,
        "hex": snapshot.get(button),
        "description": snapshot.get(button).describe(),
        "revision": snapshot.revision,
    })))
}

/// PUT /api/mapping/:button - Replace one entry
async fn set_mapping_entry(
    Path(button): Path<String>,
    State(state): State<Arc<ApiState>>,
    Json(req): Json<SetMappingRequest>,
) -> Result<Json<AppliedUpdate>, ApiError> {
    match state.apply(&button, &req.hex) {
        UpdateResult::Updated {
            button,
            message,
            revision,
        } => Ok(Json(AppliedUpdate {
            button,
            hex: message,
            revision,
        })),
        result @ UpdateResult::Rejected { .. } => Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            result.display_message(),
        )),
        result @ UpdateResult::UnknownButton { .. } => {
            Err(ApiError::new(StatusCode::NOT_FOUND, result.display_message()))
        }
    }
}

/// POST /api/simulate/:button - Hold a simulated button for `hold_ms`
async fn simulate_press(
    Path(button): Path<String>,
    Query(params): Query<SimulateParams>,
    State(state): State<Arc<ApiState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let simulator = state.simulator.clone().ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "Simulated presses are only available with the simulated GPIO backend",
        )
    })?;
    let button = button
        .parse::<ButtonId>()
        .map_err(|e| ApiError::new(StatusCode::NOT_FOUND, e.to_string()))?;
    let hold_ms = params.hold_ms.min(MAX_HOLD_MS);

    simulator.press(button);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(hold_ms)).await;
        simulator.release(button);
    });

    info!("Simulated press: {} for {}ms", button, hold_ms);
    Ok(Json(serde_json::json!({
        "ok": true,
        "button": button,
        "hold_ms": hold_ms,
    })))
}

/// GET /api/ws/mapping-updates - WebSocket for push notifications
async fn mapping_updates_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state.update_tx.subscribe()))
}

/// Forward mapping updates to one WebSocket client
async fn handle_websocket(mut socket: WebSocket, mut rx: broadcast::Receiver<MappingUpdate>) {
    debug!("WebSocket client connected for mapping updates");

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(update) => {
                        let msg = match serde_json::to_string(&update) {
                            Ok(msg) => msg,
                            Err(e) => {
                                warn!("Failed to serialize mapping update: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(msg)).await.is_err() {
                            debug!("WebSocket client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged by {} messages", n);
                    }
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client closed connection");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }
}

/// GET /api/health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// Start the API server and serve until `shutdown` resolves
pub async fn start_server(
    state: Arc<ApiState>,
    bind: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid API bind address: {}:{}", bind, port))?;
    info!("Starting admin server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
