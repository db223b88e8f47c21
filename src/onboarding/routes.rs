//! REST + WebSocket endpoints exposing the onboarding sequencer.

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use super::model::DealerInfo;
use super::sequencer::{OnboardingSequencer, OnboardingSnapshot, SequencerEvent};
use crate::error::OnboardingError;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub sequencer: OnboardingSequencer,
}

/// Build the onboarding REST + WS routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/api/onboarding", get(get_snapshot))
        .route("/api/onboarding/dealer", put(update_dealer))
        .route("/api/onboarding/start", post(start))
        .route("/api/onboarding/reset", post(reset))
        .route("/api/agents", get(list_agents))
        .with_state(state)
}

/// `*` allows any origin; an empty list allows the local dev servers only.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        warn!("CORS: allowing all origins");
        return CorsLayer::permissive();
    }

    let mut allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "CORS: ignoring invalid origin");
                None
            }
        })
        .collect();
    if allowed.is_empty() {
        allowed = ["http://localhost:3000", "http://127.0.0.1:3000"]
            .into_iter()
            .map(HeaderValue::from_static)
            .collect();
    }

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

fn error_response(err: OnboardingError) -> Response {
    match err {
        OnboardingError::Validation { ref missing_fields } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({
                "error": err.to_string(),
                "missing_fields": missing_fields,
            })),
        )
            .into_response(),
        OnboardingError::AlreadyStarted => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": err.to_string()})),
        )
            .into_response(),
        OnboardingError::NoStages => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": err.to_string()})),
        )
            .into_response(),
    }
}

// ── REST ────────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "dealer-onboarding"
    }))
}

/// GET /api/onboarding
async fn get_snapshot(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    Json(state.sequencer.snapshot().await)
}

/// PUT /api/onboarding/dealer — save the form draft.
async fn update_dealer(
    State(state): State<OnboardingRouteState>,
    Json(dealer): Json<DealerInfo>,
) -> Response {
    match state.sequencer.update_dealer_info(dealer).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/onboarding/start
async fn start(
    State(state): State<OnboardingRouteState>,
    Json(dealer): Json<DealerInfo>,
) -> Response {
    match state.sequencer.start(dealer).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => {
            debug!(error = %e, "Start request refused");
            error_response(e)
        }
    }
}

/// POST /api/onboarding/reset
async fn reset(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    Json(state.sequencer.reset().await)
}

/// GET /api/agents
async fn list_agents(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    Json(state.sequencer.agents().await)
}

// ── WebSocket ───────────────────────────────────────────────────────────

/// Commands a WS client may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    UpdateDealer { dealer: DealerInfo },
    Start { dealer: DealerInfo },
    Reset,
}

/// Server frames that are not sequencer events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame<'a> {
    Snapshot { snapshot: &'a OnboardingSnapshot },
    Error { message: String },
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<OnboardingRouteState>,
) -> impl IntoResponse {
    info!("Onboarding WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state.sequencer))
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize WS frame");
            true
        }
    }
}

async fn send_snapshot(socket: &mut WebSocket, sequencer: &OnboardingSequencer) -> bool {
    let snapshot = sequencer.snapshot().await;
    send_json(socket, &ServerFrame::Snapshot { snapshot: &snapshot }).await
}

/// What a subscriber forwards next.
enum Outgoing {
    Event(SequencerEvent),
    /// Sent after a lag in place of the events that were missed.
    Resync(OnboardingSnapshot),
}

/// Turn one broadcast result into the next frame. After a lag the backlog is
/// dropped by resubscribing before the snapshot is taken, so nothing older
/// than the snapshot follows it. `None` once the channel is closed.
async fn next_outgoing(
    result: Result<SequencerEvent, RecvError>,
    rx: &mut broadcast::Receiver<SequencerEvent>,
    sequencer: &OnboardingSequencer,
) -> Option<Outgoing> {
    match result {
        Ok(event) => Some(Outgoing::Event(event)),
        Err(RecvError::Lagged(missed)) => {
            warn!(missed, "WS client lagged behind broadcast, re-syncing");
            *rx = rx.resubscribe();
            Some(Outgoing::Resync(sequencer.snapshot().await))
        }
        Err(RecvError::Closed) => None,
    }
}

async fn handle_socket(mut socket: WebSocket, sequencer: OnboardingSequencer) {
    info!("Onboarding WebSocket client connected");

    // Subscribe before the initial snapshot so nothing falls in between.
    let mut rx = sequencer.subscribe();
    if !send_snapshot(&mut socket, &sequencer).await {
        warn!("Failed to send initial snapshot, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                let sent = match next_outgoing(result, &mut rx, &sequencer).await {
                    Some(Outgoing::Event(event)) => send_json(&mut socket, &event).await,
                    Some(Outgoing::Resync(snapshot)) => {
                        send_json(&mut socket, &ServerFrame::Snapshot { snapshot: &snapshot })
                            .await
                    }
                    None => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                };
                if !sent {
                    debug!("Client disconnected during send");
                    break;
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(message) = handle_client_message(&text, &sequencer).await {
                            if !send_json(&mut socket, &ServerFrame::Error { message }).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Onboarding WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Onboarding WebSocket connection closed");
}

/// Apply a client action. Returns an error message to send back, if any.
/// Successful actions are reported through the broadcast events.
async fn handle_client_message(text: &str, sequencer: &OnboardingSequencer) -> Option<String> {
    let action = match serde_json::from_str::<ClientAction>(text) {
        Ok(action) => action,
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
            return Some(format!("Unrecognized message: {e}"));
        }
    };
    let result = match action {
        ClientAction::UpdateDealer { dealer } => {
            sequencer.update_dealer_info(dealer).await.map(|_| ())
        }
        ClientAction::Start { dealer } => sequencer.start(dealer).await.map(|_| ()),
        ClientAction::Reset => {
            sequencer.reset().await;
            Ok(())
        }
    };
    result.err().map(|e| e.to_string())
}
