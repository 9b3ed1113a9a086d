//! Connection registry — who is connected, and as whom.
//!
//! DESIGN
//! ======
//! Every live websocket session gets one `Connection` record keyed by a fresh
//! `ConnectionId`. The record holds the verified principal, the last announced
//! status, the set of joined projects, and the sender half of the session's
//! outbound queue. The same principal on two devices is two records.
//!
//! LIFECYCLE
//! =========
//! 1. Handshake verified → `register`
//! 2. Joins/leaves update `projects` through `services::rooms`
//! 3. Socket closes or principal logs out → `unregister`, which evicts the
//!    connection from every room in its `projects` set and announces `left`
//!    in each. Dropping the record drops the only outbound sender, which ends
//!    the socket loop if it is still running.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use super::error::RealtimeError;
use super::identity::Principal;
use super::{fanout, rooms};
use crate::frame::{Data, Frame, now_ms};
use crate::state::AppState;

pub type ConnectionId = Uuid;

// =============================================================================
// TYPES
// =============================================================================

/// Self-reported availability, broadcast globally on change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Busy,
}

impl PresenceStatus {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "online" => Some(Self::Online),
            "away" => Some(Self::Away),
            "busy" => Some(Self::Busy),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Busy => "busy",
        }
    }
}

/// One live transport session.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub principal: Principal,
    pub status: Option<PresenceStatus>,
    /// Projects this connection has successfully joined and not since left.
    pub projects: HashSet<Uuid>,
    pub(crate) tx: mpsc::Sender<Frame>,
}

/// Live connections keyed by id. Lives inside `LiveState`.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub(crate) fn insert(&mut self, connection: Connection) {
        self.connections.insert(connection.id, connection);
    }

    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Connection ids owned by `user_id`.
    #[must_use]
    pub fn ids_for_user(&self, user_id: Uuid) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| c.principal.id == user_id)
            .map(|c| c.id)
            .collect()
    }

    /// Snapshot of every outbound sender except `exclude`.
    pub(crate) fn senders(&self, exclude: Option<ConnectionId>) -> Vec<(ConnectionId, mpsc::Sender<Frame>)> {
        self.connections
            .values()
            .filter(|c| exclude != Some(c.id))
            .map(|c| (c.id, c.tx.clone()))
            .collect()
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Record a verified connection and return its id.
///
/// The caller must already hold a principal from the identity verifier;
/// unauthenticated handshakes never reach this point.
pub async fn register(state: &AppState, principal: Principal, tx: mpsc::Sender<Frame>) -> ConnectionId {
    let id = Uuid::new_v4();
    let user_id = principal.id;
    let total = {
        let mut live = state.live.write().await;
        live.registry
            .insert(Connection { id, principal, status: None, projects: HashSet::new(), tx });
        live.registry.len()
    };
    info!(connection_id = %id, %user_id, connections = total, "connection registered");
    id
}

/// Resolve a connection id to a snapshot of its record.
///
/// # Errors
///
/// Returns [`RealtimeError::NotAuthenticated`] if the id is unknown, e.g. the
/// connection was unregistered by a concurrent disconnect.
pub async fn lookup(state: &AppState, id: ConnectionId) -> Result<Connection, RealtimeError> {
    let live = state.live.read().await;
    live.registry
        .get(id)
        .cloned()
        .ok_or(RealtimeError::NotAuthenticated(id))
}

/// Remove a connection and announce its departure from every joined room.
/// Returns the projects it departed. Idempotent: unknown ids are a no-op.
pub async fn unregister(state: &AppState, id: ConnectionId) -> Vec<Uuid> {
    let removed = {
        let mut guard = state.live.write().await;
        let live = &mut *guard;
        live.registry.remove(id).map(|connection| {
            let departed = rooms::evict(&mut live.rooms, &connection)
                .into_iter()
                .map(|project_id| (project_id, fanout::room_targets(live, project_id, None)))
                .collect::<Vec<_>>();
            (connection, departed)
        })
    };

    let Some((connection, departed)) = removed else {
        return Vec::new();
    };

    for (project_id, targets) in &departed {
        rooms::announce(targets, rooms::PresenceKind::Left, &connection.principal, *project_id);
    }
    let departed = departed.into_iter().map(|(project_id, _)| project_id).collect::<Vec<_>>();
    info!(
        connection_id = %id,
        user_id = %connection.principal.id,
        rooms = departed.len(),
        "connection unregistered"
    );
    departed
}

/// Unregister every connection owned by `user_id` (logout). Returns how many
/// connections were closed.
pub async fn disconnect_principal(state: &AppState, user_id: Uuid) -> usize {
    let ids = state.live.read().await.registry.ids_for_user(user_id);
    for id in &ids {
        unregister(state, *id).await;
    }
    if !ids.is_empty() {
        info!(%user_id, connections = ids.len(), "principal disconnected");
    }
    ids.len()
}

/// Record a new status and broadcast `status:changed` to every other
/// connection. Returns the delivery count.
///
/// # Errors
///
/// Returns [`RealtimeError::NotAuthenticated`] if the connection is unknown.
pub async fn set_status(state: &AppState, id: ConnectionId, status: PresenceStatus) -> Result<usize, RealtimeError> {
    let user_id = {
        let mut live = state.live.write().await;
        let connection = live
            .registry
            .get_mut(id)
            .ok_or(RealtimeError::NotAuthenticated(id))?;
        connection.status = Some(status);
        connection.principal.id
    };

    let mut data = Data::new();
    data.insert("user_id".into(), serde_json::json!(user_id));
    data.insert("status".into(), serde_json::json!(status.as_str()));
    data.insert("timestamp".into(), serde_json::json!(now_ms()));
    let frame = Frame::request("status:changed", data).with_from(user_id.to_string());

    Ok(fanout::broadcast_all(state, &frame, Some(id)).await)
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
