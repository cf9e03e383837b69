use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::KvError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("os rng error: {message}")]
    EntropyUnavailable { message: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("kv error: {0}")]
    Kv(#[from] KvError),

    #[error("failed to persist session: {message}")]
    SessionPersistFailed { message: String },

    #[error("no pending login in session")]
    NoSessionState,

    #[error("no stored state for correlation id")]
    StateMissing,

    #[error("state mismatch")]
    StateMismatch,

    #[error("authorization denied by provider: {error}")]
    AuthorizationDenied { error: String },

    #[error("code exchange failed: {message}")]
    CodeExchangeFailed { message: String },

    #[error("profile fetch failed: {message}")]
    ProfileFetchFailed { message: String },

    #[error("invalid profile response: {message}")]
    ProfileDecodeFailed { message: String },

    #[error("provider returned no user records")]
    ProfileEmpty,

    #[error("failed to cache user profile: {0}")]
    CacheWriteFailed(KvError),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoSessionState
            | Self::StateMissing
            | Self::StateMismatch
            | Self::AuthorizationDenied { .. }
            | Self::CodeExchangeFailed { .. } => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to the browser. Never includes provider bodies or
    /// backend error text.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::NoSessionState => "missing session state",
            Self::StateMissing | Self::StateMismatch => "state mismatch",
            Self::AuthorizationDenied { .. } => "authorization denied",
            Self::CodeExchangeFailed { .. } => "code-token exchange failed",
            Self::ProfileFetchFailed { .. } => "user data fetch failed",
            Self::ProfileDecodeFailed { .. } => "user data parsing failed",
            Self::ProfileEmpty => "no user data returned",
            Self::EntropyUnavailable { .. } => "could not start login",
            Self::SessionPersistFailed { .. } => "could not save session",
            _ => "internal error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "auth request failed");
        } else {
            tracing::warn!(error = %self, "auth request rejected");
        }
        (status, self.public_message()).into_response()
    }
}
