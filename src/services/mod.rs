//! Realtime services used by the websocket route and by the REST layer.
//!
//! ARCHITECTURE
//! ============
//! `identity` and `membership` are the contracts for the two external
//! collaborators. `registry`, `rooms`, `fanout`, and `signal` are the core:
//! connection lifecycle, room membership, event delivery, and ephemeral
//! editing/typing hints.

pub mod error;
pub mod fanout;
pub mod identity;
pub mod membership;
pub mod registry;
pub mod rooms;
pub mod signal;
