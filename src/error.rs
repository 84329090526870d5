// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent user-facing messages.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

/// Application error type.
///
/// Variants map one-to-one onto the failure classes callers need to react
/// to differently: re-authenticate, retry later, or report and move on.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Authentication required, connect Google Fit again")]
    AuthRequired,

    #[error("Authorization state mismatch, the redirect was rejected")]
    AuthStateMismatch,

    #[error("Timed out waiting for the authorization redirect")]
    AuthTimeout,

    #[error("An authorization attempt is already in progress")]
    AuthInProgress,

    #[error("Authorization callback rejected: {0}")]
    CallbackRejected(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Token refresh failed: {0}")]
    TransientRefresh(String),

    #[error("Google Fit request failed: {0}")]
    ProviderRequest(String),

    #[error("Failed to write {path}: {reason}")]
    DocumentWrite { path: String, reason: String },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Callback listener error: {0}")]
    CallbackListener(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Message carried by provider errors caused by HTTP 429.
    pub const PROVIDER_RATE_LIMIT: &'static str = "rate limit exceeded";

    /// Convenience constructor for document store failures.
    pub fn document(path: impl Into<String>, reason: impl ToString) -> Self {
        Error::DocumentWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the same call may succeed if repeated later without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::AuthTimeout
                | Error::TransientRefresh(_)
                | Error::ProviderRequest(_)
                | Error::DocumentWrite { .. }
        )
    }

    /// Whether this error means the user has to run the authorization flow again.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, Error::AuthRequired | Error::AuthStateMismatch)
    }

    /// Whether the provider throttled us.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::ProviderRequest(msg) if msg == Self::PROVIDER_RATE_LIMIT)
    }
}

const ERROR_PAGE: &str = "<!doctype html><html><head><title>Measurement Journal</title></head>\
<body><h2>Authorization failed</h2><p>Something went wrong. Return to the application and try again.</p></body></html>";

const REJECTED_PAGE: &str = "<!doctype html><html><head><title>Measurement Journal</title></head>\
<body><h2>Authorization incomplete</h2><p>The redirect did not include an authorization code. \
Return to the application and start again.</p></body></html>";

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, page) = match &self {
            Error::CallbackRejected(reason) => {
                tracing::warn!(reason = %reason, "Authorization callback rejected");
                (StatusCode::BAD_REQUEST, REJECTED_PAGE)
            }
            Error::InvalidInput(reason) => {
                tracing::warn!(reason = %reason, "Invalid callback request");
                (StatusCode::BAD_REQUEST, REJECTED_PAGE)
            }
            other => {
                tracing::error!(error = %other, "Callback handler failed");
                (StatusCode::INTERNAL_SERVER_ERROR, ERROR_PAGE)
            }
        };

        (status, Html(page)).into_response()
    }
}

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
