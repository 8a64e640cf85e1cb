//! Squadlink API -- HTTP surface of the hub.
//!
//! - `POST /req`: one envelope in, one response envelope out. No session.
//! - `GET /ws`: socket transport. Each text frame is one JSON envelope.
//! - `POST /api/v1/status`, `POST /api/v1/peers`: local diagnostics for the CLI.

use axum::{
    body::Bytes,
    extract::ws::{Message, WebSocket},
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{future, SinkExt, StreamExt};
use serde::Serialize;
use squadlink_hub::{Caller, ErrorKind, FrameSink, FrameStream, Hub, HubError, TransportKind};
use squadlink_protocol::{Envelope, ProtocolError, ServerMessage, MAX_FRAME_SIZE};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shared state for all API handlers.
pub struct ApiState {
    pub hub: Arc<Hub>,
    /// Parent of every socket session's cancellation token.
    pub shutdown: CancellationToken,
    pub start_time: Instant,
}

/// Build the axum router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/req", post(request))
        .route("/ws", get(websocket))
        .route("/api/v1/status", post(status))
        .route("/api/v1/peers", post(peers))
        .with_state(state)
}

/// HTTP status for a failed request.
pub fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::TransportFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Request endpoint
// ============================================================================

async fn request(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    let env: Envelope = match serde_json::from_slice(&body) {
        Ok(env) => env,
        Err(e) => {
            let reason = format!("invalid envelope: {e}");
            return (StatusCode::BAD_REQUEST, Json(ServerMessage::error("", reason))).into_response();
        }
    };

    match state.hub.handle_envelope(&Caller::detached(&env), &env).await {
        Ok(reply) => {
            let reply = reply.unwrap_or_else(|| ServerMessage::ok(&env.kind));
            (StatusCode::OK, Json(reply)).into_response()
        }
        Err(e) => {
            let kind = e.kind();
            match kind {
                ErrorKind::Internal | ErrorKind::Unavailable => {
                    tracing::warn!(kind = %env.kind, from = %env.from, error = %e, "api: request failed")
                }
                _ => tracing::debug!(kind = %env.kind, from = %env.from, error = %e, "api: request rejected"),
            }
            let reply = ServerMessage::error(&env.kind, e.to_string());
            (status_code(kind), Json(reply)).into_response()
        }
    }
}

// ============================================================================
// Socket transport
// ============================================================================

async fn websocket(ws: WebSocketUpgrade, State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    ws.max_message_size(MAX_FRAME_SIZE)
        .max_frame_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| serve_socket(socket, state))
}

fn encode_frame(msg: ServerMessage) -> Result<Message, HubError> {
    serde_json::to_string(&msg)
        .map(Message::Text)
        .map_err(|e| HubError::Internal(format!("encode reply: {e}")))
}

fn decode_frame(frame: Result<Message, axum::Error>) -> Option<Result<Envelope, HubError>> {
    match frame {
        Ok(Message::Text(text)) => Some(
            serde_json::from_str::<Envelope>(&text).map_err(|e| ProtocolError::from(e).into()),
        ),
        // Ping/pong are answered by axum; close ends the stream
        Ok(Message::Binary(_)) | Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Close(_)) => None,
        Err(e) => Some(Err(HubError::Transport(e.to_string()))),
    }
}

async fn serve_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (tx, rx) = socket.split();
    let sink: FrameSink = Box::pin(
        tx.sink_map_err(|e| HubError::Transport(e.to_string()))
            .with(|msg: ServerMessage| future::ready(encode_frame(msg))),
    );
    let stream: FrameStream = Box::pin(rx.filter_map(|frame| future::ready(decode_frame(frame))));

    if let Err(e) =
        squadlink_hub::run_session(state.hub.clone(), TransportKind::Socket, sink, stream, &state.shutdown).await
    {
        tracing::debug!(error = %e, "api: socket session ended with error");
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub peers_online: usize,
    pub squads_loaded: usize,
}

#[derive(Debug, Serialize)]
pub struct PeersResponse {
    pub total: usize,
    pub peers: Vec<String>,
}

async fn status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(StatusResponse {
        uptime_secs: state.start_time.elapsed().as_secs(),
        peers_online: state.hub.directory.len().await,
        squads_loaded: state.hub.squads.loaded().await,
    })
}

async fn peers(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let total = state.hub.directory.len().await;
    let peers = state.hub.directory.list(state.hub.settings().page_size).await;
    Json(PeersResponse { total, peers })
}
