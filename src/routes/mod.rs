//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The realtime core exposes one websocket endpoint plus a liveness probe.
//! The REST layer that produces domain events embeds the library and calls
//! `services::fanout::emit_to_project` directly; it does not go through HTTP.

pub mod ws;

use axum::extract::{Request, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(http_span))
        .with_state(state)
}

/// Request span carrying the path only. The query string can hold the
/// websocket bearer token and must never reach the logs.
fn http_span(request: &Request) -> Span {
    tracing::debug_span!("request", method = %request.method(), path = %request.uri().path())
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    connections: usize,
    rooms: usize,
}

async fn healthz(State(state): State<AppState>) -> Json<Health> {
    let (connections, rooms) = state.counts().await;
    Json(Health { status: "ok", connections, rooms })
}

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;
