//! Membership oracle — "is this principal a member of this project?"
//!
//! DESIGN
//! ======
//! The oracle is consulted on every join and on every ephemeral signal.
//! Results are never cached here: membership can be revoked between two
//! calls on the same connection.
//!
//! ERROR HANDLING
//! ==============
//! `authorize` fails closed. A store error is logged and reported to the
//! caller exactly like non-membership, so an outage can never leak project
//! events to non-members.

use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::error::RealtimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    Admin,
    Member,
    Viewer,
}

impl ProjectRole {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
            Self::Viewer => "viewer",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("membership store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("unknown project role: {0}")]
    UnknownRole(String),
}

/// Answers membership queries. Enables mocking in tests.
#[async_trait::async_trait]
pub trait MembershipOracle: Send + Sync {
    /// Role of `user_id` in `project_id`, or `None` if not a member.
    ///
    /// # Errors
    ///
    /// Returns a [`MembershipError`] if the backing store cannot answer.
    async fn role_of(&self, user_id: Uuid, project_id: Uuid) -> Result<Option<ProjectRole>, MembershipError>;
}

/// Reads membership from the `project_users` table.
#[derive(Clone)]
pub struct PgMembershipOracle {
    pool: PgPool,
}

impl PgMembershipOracle {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MembershipOracle for PgMembershipOracle {
    async fn role_of(&self, user_id: Uuid, project_id: Uuid) -> Result<Option<ProjectRole>, MembershipError> {
        let role: Option<String> =
            sqlx::query_scalar("SELECT role FROM project_users WHERE user_id = $1 AND project_id = $2")
                .bind(user_id)
                .bind(project_id)
                .fetch_optional(&self.pool)
                .await?;

        match role {
            None => Ok(None),
            Some(raw) => ProjectRole::parse(&raw)
                .map(Some)
                .ok_or(MembershipError::UnknownRole(raw)),
        }
    }
}

/// Authorize `user_id` for `project_id`, failing closed.
///
/// # Errors
///
/// Returns [`RealtimeError::AccessDenied`] when the oracle reports
/// non-membership or cannot be reached.
pub async fn authorize(
    oracle: &dyn MembershipOracle,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<ProjectRole, RealtimeError> {
    match oracle.role_of(user_id, project_id).await {
        Ok(Some(role)) => Ok(role),
        Ok(None) => Err(RealtimeError::AccessDenied(project_id)),
        Err(e) => {
            warn!(error = %e, %user_id, %project_id, "membership oracle unavailable; denying");
            Err(RealtimeError::AccessDenied(project_id))
        }
    }
}

#[cfg(test)]
#[path = "membership_test.rs"]
mod tests;
