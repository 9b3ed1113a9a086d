//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! handed to the realtime services. It holds the two external collaborators
//! (identity verifier, membership oracle) and the live connection/room state.
//!
//! The connection registry and the rooms sit behind ONE lock so that join,
//! leave, and unregister can update both sides of the user × project relation
//! atomically. Only `services::registry` mutates connection records and only
//! `services::rooms` mutates room membership; everything else reads.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::RealtimeConfig;
use crate::services::identity::IdentityVerifier;
use crate::services::membership::MembershipOracle;
use crate::services::registry::ConnectionRegistry;
use crate::services::rooms::Rooms;

// =============================================================================
// LIVE STATE
// =============================================================================

/// Process-local realtime state. Never persisted.
#[derive(Default)]
pub struct LiveState {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) rooms: Rooms,
}

impl LiveState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of non-empty rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Copy.
#[derive(Clone)]
pub struct AppState {
    pub(crate) live: Arc<RwLock<LiveState>>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub oracle: Arc<dyn MembershipOracle>,
    pub config: RealtimeConfig,
}

impl AppState {
    #[must_use]
    pub fn new(verifier: Arc<dyn IdentityVerifier>, oracle: Arc<dyn MembershipOracle>, config: RealtimeConfig) -> Self {
        Self { live: Arc::new(RwLock::new(LiveState::new())), verifier, oracle, config }
    }

    /// Snapshot of `(connections, rooms)` counts, reported by `/healthz`.
    pub async fn counts(&self) -> (usize, usize) {
        let live = self.live.read().await;
        (live.connection_count(), live.room_count())
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
