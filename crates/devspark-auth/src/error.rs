//! Authentication error types.

use thiserror::Error;

/// Coarse classification used by callers to decide how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or setup detected before any network activity.
    Configuration,
    /// Non-success response from one of the site's own `/api/auth/*` endpoints.
    Transport,
    /// Error reported by the hosted auth backend or its REST layer.
    Backend,
    /// Local failures: storage, serialization, sockets.
    Local,
}

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Provider is not in the registry
    #[error("Provider {0} not supported")]
    UnsupportedProvider(String),

    /// OAuth callback URL carried no `code` parameter
    #[error("No authorization code found in callback URL")]
    MissingAuthorizationCode,

    /// OAuth callback URL carried no `state` parameter
    #[error("No state parameter found in callback URL")]
    MissingState,

    /// `state` was never issued, already used, expired, or issued for another provider
    #[error("OAuth state verification failed")]
    StateMismatch,

    /// Provider redirected back with `error=...`
    #[error("Authorization denied by provider: {0}")]
    ProviderDenied(String),

    /// Non-success status from a site endpoint
    #[error("{message}")]
    Transport { status: u16, message: String },

    /// Error from the hosted auth backend
    #[error("{message}")]
    Backend { status: u16, message: String },

    /// Backend facade used before `init`
    #[error("Backend client not initialized")]
    NotInitialized,

    /// Operation requires a session and there is none
    #[error("Not logged in")]
    NotLoggedIn,

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] devspark_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Which part of the error taxonomy this falls in.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::UnsupportedProvider(_)
            | AuthError::MissingAuthorizationCode
            | AuthError::MissingState
            | AuthError::StateMismatch
            | AuthError::ProviderDenied(_)
            | AuthError::NotInitialized
            | AuthError::NotLoggedIn
            | AuthError::InvalidUrl(_)
            | AuthError::Config(_) => ErrorKind::Configuration,
            AuthError::Transport { .. } | AuthError::Http(_) | AuthError::Timeout => {
                ErrorKind::Transport
            }
            AuthError::Backend { .. } => ErrorKind::Backend,
            AuthError::Storage(_)
            | AuthError::Io(_)
            | AuthError::Json(_) => ErrorKind::Local,
        }
    }

    /// HTTP status carried by transport and backend errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Transport { status, .. } | AuthError::Backend { status, .. } => {
                Some(*status)
            }
            AuthError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<devspark_config::CoreError> for AuthError {
    fn from(e: devspark_config::CoreError) -> Self {
        AuthError::Config(e.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
