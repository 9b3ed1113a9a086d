//! Real-time collaboration core for the task-management backend.
//!
//! Authenticated websocket clients join per-project rooms, receive domain
//! events fanned out by the REST layer, and exchange ephemeral signals
//! (editing, typing, status). Nothing here is persisted.

pub mod config;
pub mod db;
pub mod frame;
pub mod routes;
pub mod services;
pub mod state;
