//! WebSocket handler — connection lifecycle and frame dispatch.
//!
//! DESIGN
//! ======
//! The bearer credential is verified BEFORE the upgrade, under a bounded
//! timeout. A failed handshake is answered with 401 and never creates a
//! connection record.
//!
//! After upgrade the connection is registered and enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall prefix
//! - Frames queued by fan-out → forward to client
//!
//! Handler functions return an `Outcome`; the dispatch layer decides what
//! the sender gets back. Fire-and-forget syscalls (signals, status) return
//! `Outcome::Silent` and the sender never receives a reply.
//!
//! LIFECYCLE
//! =========
//! 1. Verify credential → upgrade → register → send `session:connected`
//! 2. Client sends frames → dispatch → handler returns Outcome
//! 3. Socket closes, or the record is unregistered elsewhere (logout) and the
//!    outbound queue closes → `unregister` announces `left` in every room

use std::collections::HashMap;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::frame::{Data, FRAME_CODE, FRAME_MESSAGE, Frame, Status};
use crate::services::error::RealtimeError;
use crate::services::identity::{IdentityError, Principal, bearer_credential};
use crate::services::registry::{ConnectionId, PresenceStatus};
use crate::services::signal::{Signal, SignalKind};
use crate::services::{registry, rooms, signal};
use crate::state::AppState;

/// Close code sent when the server ends a session (e.g. logout).
const CLOSE_SESSION_ENDED: u16 = 4000;

const E_BAD_REQUEST: &str = "E_BAD_REQUEST";

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions.
enum Outcome {
    /// Send done+data to sender.
    Reply(Data),
    /// Send empty done to sender.
    Done,
    /// One-way message. Nothing goes back to the sender.
    Silent,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let credential = bearer_credential(params.get("token").map(String::as_str), authorization);

    match authenticate(&state, credential.as_deref()).await {
        Ok(principal) => ws.on_upgrade(move |socket| run_ws(socket, state, principal)),
        Err(e) => (StatusCode::UNAUTHORIZED, e.to_string()).into_response(),
    }
}

/// Verify a handshake credential within the configured timeout.
async fn authenticate(state: &AppState, credential: Option<&str>) -> Result<Principal, RealtimeError> {
    let Some(credential) = credential else {
        return Err(RealtimeError::AuthenticationFailure("no token provided".into()));
    };

    match tokio::time::timeout(state.config.auth_timeout, state.verifier.verify(credential)).await {
        Ok(Ok(principal)) => Ok(principal),
        Ok(Err(IdentityError::Rejected)) => Err(RealtimeError::AuthenticationFailure("invalid token".into())),
        Ok(Err(e)) => {
            error!(error = %e, "ws: credential verification failed");
            Err(RealtimeError::AuthenticationFailure("verification unavailable".into()))
        }
        Err(_) => {
            warn!(timeout = ?state.config.auth_timeout, "ws: credential verification timed out");
            Err(RealtimeError::AuthenticationFailure("verification timed out".into()))
        }
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, principal: Principal) {
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(state.config.client_buffer);
    let connection_id = registry::register(&state, principal.clone(), client_tx).await;

    let welcome = Frame::request("session:connected", Data::new())
        .with_data("connection_id", connection_id.to_string())
        .with_data("user", serde_json::to_value(&principal).unwrap_or_default());
    if send_frame(&mut socket, &welcome).await.is_err() {
        registry::unregister(&state, connection_id).await;
        return;
    }

    info!(%connection_id, user_id = %principal.id, name = %principal.name, "ws: client connected");

    'session: loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        for frame in process_inbound_text(&state, connection_id, &principal, &text).await {
                            if send_frame(&mut socket, &frame).await.is_err() {
                                break 'session;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            frame = client_rx.recv() => {
                let Some(frame) = frame else {
                    // Record was unregistered elsewhere; tell the client why.
                    let close = CloseFrame { code: CLOSE_SESSION_ENDED, reason: "session ended".into() };
                    let _ = socket.send(Message::Close(Some(close))).await;
                    break;
                };
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    registry::unregister(&state, connection_id).await;
    info!(%connection_id, user_id = %principal.id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
///
/// Kept apart from the socket so tests can drive dispatch end-to-end.
async fn process_inbound_text(
    state: &AppState,
    connection_id: ConnectionId,
    principal: &Principal,
    text: &str,
) -> Vec<Frame> {
    let mut req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%connection_id, error = %e, "ws: invalid inbound frame");
            let mut err = Frame::request("gateway:error", Data::new())
                .with_data(FRAME_CODE, E_BAD_REQUEST)
                .with_data(FRAME_MESSAGE, format!("invalid json: {e}"));
            err.status = Status::Error;
            return vec![err];
        }
    };

    // Stamp the authenticated principal as `from`.
    req.from = Some(principal.id.to_string());

    let prefix = req.prefix();
    debug!(%connection_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");

    let result = match prefix {
        "project" => handle_project(state, connection_id, &req).await,
        "task" | "comment" => Ok(handle_signal(state, connection_id, &req).await),
        "status" => Ok(handle_status(state, connection_id, &req).await),
        _ => Err(bad_request(&req, format!("unknown prefix: {prefix}"))),
    };

    match result {
        Ok(Outcome::Reply(data)) => vec![req.done_with(data)],
        Ok(Outcome::Done) => vec![req.done()],
        Ok(Outcome::Silent) => vec![],
        Err(err_frame) => vec![err_frame],
    }
}

// =============================================================================
// PROJECT HANDLERS
// =============================================================================

async fn handle_project(state: &AppState, connection_id: ConnectionId, req: &Frame) -> Result<Outcome, Frame> {
    let Some(project_id) = req.uuid_field("project_id") else {
        return Err(bad_request(req, "project_id required"));
    };

    match req.op() {
        "join" => match rooms::join(state, connection_id, project_id).await {
            Ok(outcome) => {
                let mut data = Data::new();
                data.insert("project_id".into(), serde_json::json!(project_id));
                data.insert("role".into(), serde_json::json!(outcome.role));
                data.insert("members".into(), serde_json::json!(outcome.members));
                Ok(Outcome::Reply(data))
            }
            Err(e) => {
                info!(%connection_id, %project_id, error = %e, "ws: join refused");
                Err(req.error_from(&e))
            }
        },
        "leave" => {
            rooms::leave(state, connection_id, project_id).await;
            Ok(Outcome::Done)
        }
        op => Err(bad_request(req, format!("unknown project op: {op}"))),
    }
}

// =============================================================================
// SIGNAL HANDLERS (fire-and-forget)
// =============================================================================

async fn handle_signal(state: &AppState, connection_id: ConnectionId, req: &Frame) -> Outcome {
    let kind = match req.syscall.as_str() {
        "task:editing" => SignalKind::Editing,
        "comment:typing" => SignalKind::Typing,
        other => {
            debug!(%connection_id, syscall = other, "ws: unknown signal dropped");
            return Outcome::Silent;
        }
    };

    let active = req.data.get("active").and_then(serde_json::Value::as_bool);
    let (Some(project_id), Some(task_id), Some(active)) =
        (req.uuid_field("project_id"), req.uuid_field("task_id"), active)
    else {
        debug!(%connection_id, syscall = %req.syscall, "ws: malformed signal dropped");
        return Outcome::Silent;
    };

    if let Err(e) = signal::relay(state, connection_id, Signal { project_id, task_id, kind, active }).await {
        debug!(%connection_id, %project_id, error = %e, "ws: signal dropped");
    }
    Outcome::Silent
}

async fn handle_status(state: &AppState, connection_id: ConnectionId, req: &Frame) -> Outcome {
    let Some(status) = req
        .data
        .get("status")
        .and_then(|v| v.as_str())
        .and_then(PresenceStatus::parse)
    else {
        debug!(%connection_id, "ws: invalid status dropped");
        return Outcome::Silent;
    };

    if let Err(e) = registry::set_status(state, connection_id, status).await {
        debug!(%connection_id, error = %e, "ws: status dropped");
    }
    Outcome::Silent
}

// =============================================================================
// HELPERS
// =============================================================================

fn bad_request(req: &Frame, message: impl Into<String>) -> Frame {
    req.error(message).with_data(FRAME_CODE, E_BAD_REQUEST)
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame
            .data
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        let message = frame
            .data
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else {
        debug!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
