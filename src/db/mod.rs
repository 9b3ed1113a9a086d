//! Database pool initialization.
//!
//! SYSTEM CONTEXT
//! ==============
//! The realtime layer owns no tables of its own and runs no migrations. The
//! pool exists so the default identity verifier and membership oracle can read
//! the `sessions`, `users`, and `project_users` tables maintained by the REST
//! layer, which also owns their schema.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Pool options for the read-only collaborator queries.
#[must_use]
pub fn pool_options(max_connections: u32) -> PgPoolOptions {
    PgPoolOptions::new().max_connections(max_connections.max(1))
}

/// Initialize the `PostgreSQL` connection pool.
///
/// # Errors
///
/// Returns an error if the database cannot be reached.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    pool_options(max_connections).connect(database_url).await
}

#[cfg(test)]
#[path = "db_test.rs"]
mod tests;
