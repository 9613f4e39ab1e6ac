//! Session error types.

use crate::transport::TransportError;
use thiserror::Error;

/// A refresh episode failed. Shared by every caller that waited on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Token refresh failed: {reason}")]
pub struct RefreshFailed {
    pub reason: String,
}

impl RefreshFailed {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Session error type.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The backend could not be reached
    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    /// Access token rejected and no further refresh is possible for this request
    #[error("Session expired")]
    AuthExpired,

    /// Refresh endpoint rejected the refresh token or was unreachable
    #[error(transparent)]
    RefreshFailed(#[from] RefreshFailed),

    /// Backend reported field or credential problems
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Non-2xx response outside the authorization retry path
    #[error("HTTP {status}")]
    Http { status: u16, body: String },

    /// Credential storage error
    #[error("Storage error: {0}")]
    Storage(#[from] credential_store::StorageError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Event not allowed in the current session phase
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors are transport failures and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            SessionError::Network(e) => e.is_transient(),
            SessionError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if the session was torn down as a result of this error.
    pub fn is_auth_expired(&self) -> bool {
        matches!(
            self,
            SessionError::AuthExpired | SessionError::RefreshFailed(_)
        )
    }
}

impl From<session_config::CoreError> for SessionError {
    fn from(err: session_config::CoreError) -> Self {
        SessionError::Config(err.to_string())
    }
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;
