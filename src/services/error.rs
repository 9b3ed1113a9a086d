//! Error taxonomy shared by the realtime services.
//!
//! Only `AuthenticationFailure` is fatal to a connection, and it can only
//! happen before one exists. Everything else stays local to the request (or,
//! for delivery, to the single recipient; see `fanout::DeliveryFailure`).

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeError {
    #[error("authentication error: {0}")]
    AuthenticationFailure(String),
    #[error("connection not registered: {0}")]
    NotAuthenticated(Uuid),
    #[error("access denied to project {0}")]
    AccessDenied(Uuid),
}

impl crate::frame::ErrorCode for RealtimeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailure(_) => "E_AUTHENTICATION",
            Self::NotAuthenticated(_) => "E_NOT_AUTHENTICATED",
            Self::AccessDenied(_) => "E_ACCESS_DENIED",
        }
    }
}
