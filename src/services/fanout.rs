//! Event fan-out — deliver one frame to every member of a room.
//!
//! DESIGN
//! ======
//! Fan-out snapshots the room's senders under a read lock, releases the lock,
//! then pushes the frame onto each connection's outbound queue with
//! `try_send`. A recipient that disconnects mid-broadcast cannot disturb the
//! iteration, and a slow recipient cannot stall the others.
//!
//! Per-room ordering is FIFO per caller: each connection's queue receives
//! frames in the order `broadcast` was invoked.
//!
//! ERROR HANDLING
//! ==============
//! Per-recipient failures (queue closed or full) are logged and skipped. The
//! caller only learns how many deliveries succeeded.
//!
//! There is no authorization here. Producers are trusted to have authorized
//! the mutation; the router only decides who is currently listening.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;
use uuid::Uuid;

use super::registry::ConnectionId;
use crate::frame::{Data, Frame};
use crate::state::{AppState, LiveState};

pub(crate) type Target = (ConnectionId, mpsc::Sender<Frame>);

/// Event names emitted by the REST layer after a committed mutation.
pub mod events {
    pub const TASK_CREATED: &str = "task_created";
    pub const TASK_UPDATED: &str = "task_updated";
    pub const TASK_DELETED: &str = "task_deleted";
    pub const TASK_ATTACHMENT_ADDED: &str = "task_attachment_added";
    pub const TASK_COMMENT_ADDED: &str = "task_comment_added";
    pub const PROJECT_UPDATED: &str = "project_updated";
    pub const PROJECT_DELETED: &str = "project_deleted";
    pub const MEMBER_ADDED: &str = "member_added";
    pub const MEMBER_REMOVED: &str = "member_removed";
}

/// Data key carrying a domain event's payload, untouched.
pub const PAYLOAD_KEY: &str = "payload";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryFailure {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full")]
    Backpressure,
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Deliver `frame` to every member of the project's room except `exclude`.
/// Returns the number of successful deliveries.
pub async fn broadcast(state: &AppState, project_id: Uuid, frame: &Frame, exclude: Option<ConnectionId>) -> usize {
    let targets = room_targets(&*state.live.read().await, project_id, exclude);
    deliver_all(&targets, frame)
}

/// Snapshot the outbound senders of a room's members except `exclude`.
///
/// Callers that mutate the room take this snapshot under the same guard, so
/// the recipient set is the one that existed at mutation time.
pub(crate) fn room_targets(live: &LiveState, project_id: Uuid, exclude: Option<ConnectionId>) -> Vec<Target> {
    live.rooms
        .members(project_id)
        .into_iter()
        .filter(|id| exclude != Some(*id))
        .filter_map(|id| live.registry.get(id).map(|c| (id, c.tx.clone())))
        .collect()
}

/// Deliver `frame` to every registered connection except `exclude`, regardless
/// of room. Used for global status changes.
pub async fn broadcast_all(state: &AppState, frame: &Frame, exclude: Option<ConnectionId>) -> usize {
    let targets = state.live.read().await.registry.senders(exclude);
    deliver_all(&targets, frame)
}

/// Producer-facing entry point: fan a committed domain event out to the
/// project's room. The payload is forwarded verbatim under `data.payload`.
pub async fn emit_to_project(state: &AppState, project_id: Uuid, event: &str, payload: serde_json::Value) -> usize {
    let mut data = Data::new();
    data.insert(PAYLOAD_KEY.into(), payload);
    let frame = Frame::request(event, data).with_project_id(project_id);
    broadcast(state, project_id, &frame, None).await
}

// =============================================================================
// DELIVERY
// =============================================================================

pub(crate) fn deliver(tx: &mpsc::Sender<Frame>, frame: Frame) -> Result<(), DeliveryFailure> {
    tx.try_send(frame).map_err(|e| match e {
        TrySendError::Full(_) => DeliveryFailure::Backpressure,
        TrySendError::Closed(_) => DeliveryFailure::Closed,
    })
}

pub(crate) fn deliver_all(targets: &[Target], frame: &Frame) -> usize {
    let mut delivered = 0;
    for (connection_id, tx) in targets {
        match deliver(tx, frame.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => warn!(%connection_id, syscall = %frame.syscall, error = %e, "fanout: delivery failed"),
        }
    }
    delivered
}

#[cfg(test)]
#[path = "fanout_test.rs"]
mod tests;
