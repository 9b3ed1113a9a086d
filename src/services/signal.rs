//! Ephemeral signal relay — "X is editing task T" / "X is typing on task T".
//!
//! DESIGN
//! ======
//! Signals are fire-and-forget UX hints. Each emission is re-authorized with
//! the membership oracle (room membership from join time is not trusted,
//! since membership can be revoked mid-session), broadcast once to the
//! project's room excluding the sender, and forgotten. Nothing is retained:
//! a late joiner does not learn who is currently editing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::RealtimeError;
use super::registry::{self, ConnectionId};
use super::{fanout, membership};
use crate::frame::{Data, Frame, now_ms};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Editing,
    Typing,
}

impl SignalKind {
    #[must_use]
    pub fn syscall(self) -> &'static str {
        match self {
            Self::Editing => "signal:editing",
            Self::Typing => "signal:typing",
        }
    }
}

/// One signal emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    pub project_id: Uuid,
    pub task_id: Uuid,
    pub kind: SignalKind,
    pub active: bool,
}

/// Authorize and relay one signal. Returns the delivery count.
///
/// # Errors
///
/// - [`RealtimeError::NotAuthenticated`] if the connection is unknown or
///   disappeared while the oracle was consulted.
/// - [`RealtimeError::AccessDenied`] if the sender is not a project member.
///
/// The websocket layer drops both silently; they exist for callers and tests.
pub async fn relay(state: &AppState, connection_id: ConnectionId, signal: Signal) -> Result<usize, RealtimeError> {
    let principal = registry::lookup(state, connection_id).await?.principal;
    membership::authorize(state.oracle.as_ref(), principal.id, signal.project_id).await?;

    // The oracle call may have raced a disconnect.
    registry::lookup(state, connection_id).await?;

    let mut data = Data::new();
    data.insert("kind".into(), serde_json::json!(signal.kind));
    data.insert("task_id".into(), serde_json::json!(signal.task_id));
    data.insert("user".into(), serde_json::json!(principal));
    data.insert("active".into(), serde_json::json!(signal.active));
    data.insert("timestamp".into(), serde_json::json!(now_ms()));
    let frame = Frame::request(signal.kind.syscall(), data)
        .with_project_id(signal.project_id)
        .with_from(principal.id.to_string());

    Ok(fanout::broadcast(state, signal.project_id, &frame, Some(connection_id)).await)
}

#[cfg(test)]
#[path = "signal_test.rs"]
mod tests;
