// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth2 token endpoint client.
//!
//! Handles:
//! - Authorization URL construction
//! - Authorization-code and refresh-token grants
//! - Classification of token endpoint failures (rejected vs. transient)
//!
//! Nothing here touches persisted state; callers only see a validated
//! [`TokenGrant`] or a classified error.

use serde::Deserialize;

use crate::config::Config;
use crate::models::TokenGrant;

/// Scopes needed to read and write body measurements.
pub const FIT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/fitness.body.read",
    "https://www.googleapis.com/auth/fitness.body.write",
];

/// Provider error codes that mean the token itself is dead.
const REJECTED_ERROR_CODES: &[&str] = &["invalid_grant", "invalid_token"];

/// Token endpoint failure, classified for retry decisions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenEndpointError {
    /// The provider explicitly invalidated the grant. Never retried.
    #[error("grant rejected by provider ({0})")]
    Rejected(String),

    /// Network failure, 5xx, or an unusable response body.
    #[error("{0}")]
    Transient(String),
}

/// Google OAuth client.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    redirect_uri: String,
}

impl GoogleOAuthClient {
    /// Create a new OAuth client from process configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            redirect_uri: config.redirect_uri(),
        }
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Authorization URL carrying `state` as the anti-forgery nonce.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?\
             client_id={}&\
             redirect_uri={}&\
             response_type=code&\
             scope={}&\
             access_type=offline&\
             state={}&\
             prompt=consent",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&FIT_SCOPES.join(" ")),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, TokenEndpointError> {
        self.request_token(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    /// Obtain a new access token from a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, TokenEndpointError> {
        self.request_token(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenGrant, TokenEndpointError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| TokenEndpointError::Transient(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<TokenResponse> = serde_json::from_str(&body).ok();

        if let Some(code) = parsed.as_ref().and_then(|p| p.error.as_deref()) {
            tracing::warn!(status = %status, body = %body, "Token endpoint returned an error");
            return Err(classify_error_code(code, status));
        }

        if !status.is_success() {
            tracing::warn!(status = %status, body = %body, "Token endpoint request failed");
            return Err(TokenEndpointError::Transient(format!(
                "token endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let Some(parsed) = parsed else {
            tracing::warn!(body = %body, "Unparseable token response");
            return Err(TokenEndpointError::Transient(
                "malformed token response".to_string(),
            ));
        };

        parsed.into_grant()
    }
}

fn classify_error_code(code: &str, status: reqwest::StatusCode) -> TokenEndpointError {
    if REJECTED_ERROR_CODES.contains(&code) {
        TokenEndpointError::Rejected(code.to_string())
    } else {
        TokenEndpointError::Transient(format!(
            "token endpoint returned {code} (HTTP {})",
            status.as_u16()
        ))
    }
}

/// Raw token endpoint response. Everything optional: validation happens in
/// [`TokenResponse::into_grant`].
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    error: Option<String>,
}

impl TokenResponse {
    fn into_grant(self) -> Result<TokenGrant, TokenEndpointError> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                TokenEndpointError::Transient("token response has no access_token".to_string())
            })?;
        let expires_in_secs = self.expires_in.filter(|s| *s > 0).ok_or_else(|| {
            TokenEndpointError::Transient("token response has no usable expires_in".to_string())
        })?;

        Ok(TokenGrant {
            access_token,
            expires_in_secs,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> TokenResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_authorize_url_has_required_parameters() {
        let client = GoogleOAuthClient::new(&Config::test_default());
        let url = client.authorize_url("nonce-123");

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=123456789-test.apps.googleusercontent.com"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A42813%2Fcallback"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("state=nonce-123"));
        assert!(url.contains("fitness.body.read"));
    }

    #[test]
    fn test_grant_requires_access_token() {
        let err = response(r#"{"expires_in":3600}"#).into_grant().unwrap_err();
        assert!(matches!(err, TokenEndpointError::Transient(_)));

        let err = response(r#"{"access_token":"","expires_in":3600}"#)
            .into_grant()
            .unwrap_err();
        assert!(matches!(err, TokenEndpointError::Transient(_)));
    }

    #[test]
    fn test_grant_requires_expiry() {
        let err = response(r#"{"access_token":"a"}"#).into_grant().unwrap_err();
        assert!(matches!(err, TokenEndpointError::Transient(_)));
    }

    #[test]
    fn test_grant_accepts_missing_refresh_token() {
        let grant = response(r#"{"access_token":"a","expires_in":3599}"#)
            .into_grant()
            .unwrap();
        assert_eq!(grant.access_token, "a");
        assert_eq!(grant.expires_in_secs, 3599);
        assert_eq!(grant.refresh_token, None);
    }

    #[test]
    fn test_error_classification() {
        let status = reqwest::StatusCode::BAD_REQUEST;
        assert_eq!(
            classify_error_code("invalid_grant", status),
            TokenEndpointError::Rejected("invalid_grant".to_string())
        );
        assert_eq!(
            classify_error_code("invalid_token", reqwest::StatusCode::UNAUTHORIZED),
            TokenEndpointError::Rejected("invalid_token".to_string())
        );
        assert!(matches!(
            classify_error_code("temporarily_unavailable", status),
            TokenEndpointError::Transient(_)
        ));
    }
}
