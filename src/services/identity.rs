//! Identity verification for websocket handshakes.
//!
//! ARCHITECTURE
//! ============
//! The realtime layer never issues credentials. The REST layer creates
//! sessions at login; the websocket handshake presents the session token as
//! a bearer credential and this module turns it into a `Principal`.

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Verified identity of a connected user. Immutable for the connection's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("credential rejected")]
    Rejected,
    #[error("identity store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Resolves a bearer credential to a principal. Enables mocking in tests.
#[async_trait::async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify a bearer credential.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Rejected`] for unknown, expired, or inactive
    /// credentials and [`IdentityError::Store`] when the backing store fails.
    async fn verify(&self, credential: &str) -> Result<Principal, IdentityError>;
}

/// Verifies session tokens against the `sessions` and `users` tables.
#[derive(Clone)]
pub struct PgSessionVerifier {
    pool: PgPool,
}

impl PgSessionVerifier {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IdentityVerifier for PgSessionVerifier {
    async fn verify(&self, credential: &str) -> Result<Principal, IdentityError> {
        let row = sqlx::query(
            r"SELECT u.id, u.name, u.avatar_url
              FROM sessions s
              JOIN users u ON u.id = s.user_id
              WHERE s.token = $1 AND s.expires_at > now() AND u.is_active",
        )
        .bind(credential)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(IdentityError::Rejected);
        };
        Ok(Principal { id: row.get("id"), name: row.get("name"), avatar_url: row.get("avatar_url") })
    }
}

/// Extract a bearer credential from the `token` query parameter or an
/// `Authorization: Bearer <token>` header. Query wins; browsers cannot set
/// headers on websocket upgrades.
#[must_use]
pub fn bearer_credential(query_token: Option<&str>, authorization: Option<&str>) -> Option<String> {
    if let Some(token) = query_token.map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token.to_owned());
    }
    let header = authorization?.trim();
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_owned())
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
