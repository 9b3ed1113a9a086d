use std::sync::Arc;

use taskflow_realtime::config::Config;
use taskflow_realtime::services::identity::PgSessionVerifier;
use taskflow_realtime::services::membership::PgMembershipOracle;
use taskflow_realtime::{db, routes, state};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().expect("invalid configuration");

    let pool = db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("database init failed");

    let state = state::AppState::new(
        Arc::new(PgSessionVerifier::new(pool.clone())),
        Arc::new(PgMembershipOracle::new(pool)),
        config.realtime,
    );

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = config.port, "taskflow-realtime listening");
    axum::serve(listener, app).await.expect("server failed");
}
