//! Subscription manager — per-project rooms and presence announcements.
//!
//! DESIGN
//! ======
//! A room is the set of connections subscribed to one project's events. It is
//! created on first join and evicted when its last member leaves. The
//! connection's own `projects` set and the room set are always updated under
//! the same write lock, so "C is in room P" ⇔ "P is in C.projects".
//!
//! CONCURRENCY
//! ===========
//! `join` awaits the membership oracle with no lock held. The connection may
//! be unregistered during that await, so existence is re-checked under the
//! write lock before anything is mutated.
//!
//! Presence recipients are snapshotted under the same write guard that
//! mutates the room. A concurrent join can therefore never be announced to a
//! connection whose own join reply already listed it, and every member sees
//! joins and departures in the order they were applied.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::error::RealtimeError;
use super::fanout::{self, Target};
use super::identity::Principal;
use super::membership::{self, ProjectRole};
use super::registry::{Connection, ConnectionId};
use crate::frame::{Data, Frame, now_ms};
use crate::state::AppState;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceKind {
    Joined,
    Left,
}

impl PresenceKind {
    #[must_use]
    pub fn syscall(self) -> &'static str {
        match self {
            Self::Joined => "presence:joined",
            Self::Left => "presence:left",
        }
    }
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub role: ProjectRole,
    /// False when the connection was already in the room (no presence event sent).
    pub newly_joined: bool,
    /// Principals in the room after the join, including the joiner.
    pub members: Vec<Principal>,
}

/// Room membership keyed by project. Lives inside `LiveState`.
#[derive(Debug, Default)]
pub struct Rooms {
    rooms: HashMap<Uuid, HashSet<ConnectionId>>,
}

impl Rooms {
    /// Add a member, creating the room if needed. Returns false if already present.
    pub(crate) fn add(&mut self, project_id: Uuid, connection_id: ConnectionId) -> bool {
        self.rooms
            .entry(project_id)
            .or_default()
            .insert(connection_id)
    }

    /// Remove a member, evicting the room once empty. Returns false if absent.
    pub(crate) fn remove(&mut self, project_id: Uuid, connection_id: ConnectionId) -> bool {
        let Some(room) = self.rooms.get_mut(&project_id) else {
            return false;
        };
        let removed = room.remove(&connection_id);
        if room.is_empty() {
            self.rooms.remove(&project_id);
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, project_id: Uuid, connection_id: ConnectionId) -> bool {
        self.rooms
            .get(&project_id)
            .is_some_and(|room| room.contains(&connection_id))
    }

    /// Snapshot of the room's members. Empty for unknown projects.
    #[must_use]
    pub fn members(&self, project_id: Uuid) -> Vec<ConnectionId> {
        self.rooms
            .get(&project_id)
            .map(|room| room.iter().copied().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Subscribe a connection to a project's room after checking membership.
///
/// Re-joining a room is a successful no-op and announces nothing.
///
/// # Errors
///
/// - [`RealtimeError::NotAuthenticated`] if the connection is unknown, before
///   or after the oracle call.
/// - [`RealtimeError::AccessDenied`] if the oracle denies or is unavailable.
///   No state changes in either case.
pub async fn join(state: &AppState, connection_id: ConnectionId, project_id: Uuid) -> Result<JoinOutcome, RealtimeError> {
    let principal = super::registry::lookup(state, connection_id).await?.principal;
    let role = membership::authorize(state.oracle.as_ref(), principal.id, project_id).await?;

    let (newly_joined, members, targets) = {
        let mut guard = state.live.write().await;
        let live = &mut *guard;
        let connection = live
            .registry
            .get_mut(connection_id)
            .ok_or(RealtimeError::NotAuthenticated(connection_id))?;
        connection.projects.insert(project_id);
        let newly_joined = live.rooms.add(project_id, connection_id);

        let members = live
            .rooms
            .members(project_id)
            .into_iter()
            .filter_map(|id| live.registry.get(id))
            .map(|c| c.principal.clone())
            .collect::<Vec<_>>();
        let targets = if newly_joined {
            fanout::room_targets(live, project_id, Some(connection_id))
        } else {
            Vec::new()
        };
        (newly_joined, members, targets)
    };

    if newly_joined {
        info!(%connection_id, user_id = %principal.id, %project_id, members = members.len(), "joined project room");
        announce(&targets, PresenceKind::Joined, &principal, project_id);
    }
    Ok(JoinOutcome { role, newly_joined, members })
}

/// Unsubscribe a connection from a project's room. Always safe: leaving a room
/// the connection never joined does nothing and announces nothing.
pub async fn leave(state: &AppState, connection_id: ConnectionId, project_id: Uuid) {
    let departed = {
        let mut guard = state.live.write().await;
        let live = &mut *guard;
        let principal = live.registry.get_mut(connection_id).map(|connection| {
            connection.projects.remove(&project_id);
            connection.principal.clone()
        });
        let was_member = live.rooms.remove(project_id, connection_id);
        principal
            .filter(|_| was_member)
            .map(|principal| (principal, fanout::room_targets(live, project_id, None)))
    };

    if let Some((principal, targets)) = departed {
        info!(%connection_id, user_id = %principal.id, %project_id, "left project room");
        announce(&targets, PresenceKind::Left, &principal, project_id);
    }
}

/// Current members of a project's room.
pub async fn room_members(state: &AppState, project_id: Uuid) -> Vec<ConnectionId> {
    state.live.read().await.rooms.members(project_id)
}

// =============================================================================
// INTERNALS
// =============================================================================

/// Remove an already-unregistered connection from every room in its
/// `projects` set. Returns the rooms it was evicted from.
pub(crate) fn evict(rooms: &mut Rooms, connection: &Connection) -> Vec<Uuid> {
    connection
        .projects
        .iter()
        .copied()
        .filter(|project_id| rooms.remove(*project_id, connection.id))
        .collect()
}

/// Send a presence event to recipients captured when the room changed.
pub(crate) fn announce(targets: &[Target], kind: PresenceKind, principal: &Principal, project_id: Uuid) -> usize {
    let frame = presence_frame(kind, principal, project_id);
    fanout::deliver_all(targets, &frame)
}

fn presence_frame(kind: PresenceKind, principal: &Principal, project_id: Uuid) -> Frame {
    let mut data = Data::new();
    data.insert("kind".into(), serde_json::json!(kind));
    data.insert("user".into(), serde_json::json!(principal));
    data.insert("project_id".into(), serde_json::json!(project_id));
    data.insert("timestamp".into(), serde_json::json!(now_ms()));
    Frame::request(kind.syscall(), data)
        .with_project_id(project_id)
        .with_from(principal.id.to_string())
}

#[cfg(test)]
#[path = "rooms_test.rs"]
mod tests;
