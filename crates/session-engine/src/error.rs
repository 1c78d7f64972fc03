//! Authentication error types.

use crate::provider::ProviderKind;
use thiserror::Error;

/// Authentication error type.
///
/// `Clone` so every caller joined on one coalesced session fetch receives the
/// same failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Sign-in or sign-up rejected by the endpoint
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Refresh endpoint rejected the refresh token
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// No token to act on
    #[error("Not logged in")]
    NotLoggedIn,

    /// Sign-up endpoint failure
    #[error("Sign-up failed: {0}")]
    SignUp(String),

    /// Unexpected HTTP status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection-level failure (transient, can retry)
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error, raised before any network call
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capability not offered by the active provider
    #[error("{operation} is not supported by the {provider} provider")]
    Unsupported {
        operation: &'static str,
        provider: ProviderKind,
    },

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid state transition in the scheduler FSM
    #[error("Invalid scheduler state transition: {0}")]
    InvalidStateTransition(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include network failures, timeouts and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Network(_) | AuthError::Timeout => true,
            AuthError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if the endpoint explicitly refused the caller.
    pub fn is_auth_rejection(&self) -> bool {
        match self {
            AuthError::InvalidCredentials(_) | AuthError::TokenRefresh(_) => true,
            AuthError::Http { status, .. } => matches!(status, 401 | 403),
            _ => false,
        }
    }

    pub(crate) fn unsupported(operation: &'static str, provider: ProviderKind) -> Self {
        AuthError::Unsupported {
            operation,
            provider,
        }
    }
}

impl From<token_storage::StorageError> for AuthError {
    fn from(err: token_storage::StorageError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl From<auth_config::ConfigError> for AuthError {
    fn from(err: auth_config::ConfigError) -> Self {
        AuthError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::InvalidResponse(err.to_string())
    }
}

impl From<url::ParseError> for AuthError {
    fn from(err: url::ParseError) -> Self {
        AuthError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return AuthError::Timeout;
        }
        if let Some(status) = err.status() {
            return AuthError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        if err.is_decode() {
            return AuthError::InvalidResponse(err.to_string());
        }
        AuthError::Network(err.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
