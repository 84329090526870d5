// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stored OAuth credential and the in-flight authorization attempt.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Margin before token expiration when we proactively refresh (5 minutes).
pub const TOKEN_REFRESH_MARGIN_MS: i64 = 5 * 60 * 1000;

/// OAuth credential persisted in the settings blob.
///
/// Every mutation goes through one of the `with_*` / `without_*` builders,
/// which return a fresh snapshot. The snapshot is then persisted whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at_epoch_ms: Option<i64>,
    pub pending_auth_state: Option<String>,
}

impl Credential {
    /// Neither an access token nor a refresh token is stored.
    pub fn has_no_tokens(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }

    /// An access token is never stored without its expiry.
    pub fn is_consistent(&self) -> bool {
        self.access_token.is_none() || self.expires_at_epoch_ms.is_some()
    }

    /// Whether the access token must be refreshed before use at `now_ms`.
    pub fn needs_refresh(&self, now_ms: i64) -> bool {
        match (&self.access_token, self.expires_at_epoch_ms) {
            (Some(_), Some(expires_at)) => now_ms + TOKEN_REFRESH_MARGIN_MS >= expires_at,
            _ => true,
        }
    }

    /// Snapshot with a freshly granted token pair applied.
    ///
    /// A grant without a refresh token keeps the stored one. The pending
    /// authorization state is consumed.
    pub fn with_grant(&self, grant: &TokenGrant, now_ms: i64) -> Self {
        Self {
            access_token: Some(grant.access_token.clone()),
            refresh_token: grant
                .refresh_token
                .clone()
                .or_else(|| self.refresh_token.clone()),
            expires_at_epoch_ms: Some(
                now_ms.saturating_add(grant.expires_in_secs.saturating_mul(1000)),
            ),
            pending_auth_state: None,
        }
    }

    /// Snapshot after a refresh grant. Unlike [`Credential::with_grant`], an
    /// authorization attempt running concurrently keeps its nonce.
    pub fn with_refreshed(&self, grant: &TokenGrant, now_ms: i64) -> Self {
        Self {
            pending_auth_state: self.pending_auth_state.clone(),
            ..self.with_grant(grant, now_ms)
        }
    }

    /// Snapshot with the access token and expiry dropped.
    pub fn without_access(&self) -> Self {
        Self {
            access_token: None,
            expires_at_epoch_ms: None,
            ..self.clone()
        }
    }

    /// Snapshot carrying a new authorization nonce.
    pub fn with_pending_state(&self, nonce: &str) -> Self {
        Self {
            pending_auth_state: Some(nonce.to_string()),
            ..self.clone()
        }
    }

    /// Expiry as a timestamp, if known.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at_epoch_ms
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }
}

/// Validated result of a successful token-endpoint call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in_secs: i64,
    pub refresh_token: Option<String>,
}

/// One interactive authorization attempt, live until its callback arrives
/// or it ages out.
#[derive(Debug, Clone)]
pub struct AuthorizationAttempt {
    pub nonce: String,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationAttempt {
    pub fn new(nonce: String) -> Self {
        Self {
            nonce,
            created_at: Utc::now(),
        }
    }

    /// Whether the attempt is older than `max_age` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.created_at >= max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(refresh: Option<&str>) -> TokenGrant {
        TokenGrant {
            access_token: "access".to_string(),
            expires_in_secs: 3600,
            refresh_token: refresh.map(str::to_string),
        }
    }

    #[test]
    fn test_refresh_only_credential_needs_refresh() {
        let credential = Credential {
            refresh_token: Some("refresh".to_string()),
            ..Default::default()
        };
        assert!(!credential.has_no_tokens());
        assert!(credential.needs_refresh(0));
        assert!(credential.is_consistent());
    }

    #[test]
    fn test_needs_refresh_inside_margin() {
        let now = 1_700_000_000_000;
        let credential = Credential {
            access_token: Some("a".to_string()),
            expires_at_epoch_ms: Some(now + TOKEN_REFRESH_MARGIN_MS),
            ..Default::default()
        };
        assert!(credential.needs_refresh(now));
        assert!(!credential.needs_refresh(now - 1));
    }

    #[test]
    fn test_access_without_expiry_is_inconsistent() {
        let credential = Credential {
            access_token: Some("a".to_string()),
            ..Default::default()
        };
        assert!(!credential.is_consistent());
        assert!(credential.needs_refresh(0));
    }

    #[test]
    fn test_with_grant_keeps_refresh_token_and_consumes_state() {
        let credential = Credential {
            refresh_token: Some("old-refresh".to_string()),
            pending_auth_state: Some("nonce".to_string()),
            ..Default::default()
        };
        let updated = credential.with_grant(&grant(None), 1_000);
        assert_eq!(updated.access_token.as_deref(), Some("access"));
        assert_eq!(updated.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(updated.expires_at_epoch_ms, Some(1_000 + 3_600_000));
        assert_eq!(updated.pending_auth_state, None);

        let rotated = credential.with_grant(&grant(Some("new-refresh")), 1_000);
        assert_eq!(rotated.refresh_token.as_deref(), Some("new-refresh"));
    }

    #[test]
    fn test_absurd_expires_in_saturates() {
        let huge = TokenGrant {
            expires_in_secs: i64::MAX,
            ..grant(None)
        };
        let updated = Credential::default().with_grant(&huge, 1_000);
        assert_eq!(updated.expires_at_epoch_ms, Some(i64::MAX));
        assert!(!updated.needs_refresh(1_000));
    }

    #[test]
    fn test_refresh_keeps_pending_state() {
        let credential = Credential {
            refresh_token: Some("r".to_string()),
            pending_auth_state: Some("nonce".to_string()),
            ..Default::default()
        };
        let refreshed = credential.with_refreshed(&grant(None), 0);
        assert_eq!(refreshed.pending_auth_state.as_deref(), Some("nonce"));
        assert_eq!(refreshed.refresh_token.as_deref(), Some("r"));
        assert!(refreshed.is_consistent());
    }

    #[test]
    fn test_without_access_keeps_refresh_token() {
        let credential = Credential {
            access_token: Some("a".to_string()),
            refresh_token: Some("r".to_string()),
            expires_at_epoch_ms: Some(5),
            pending_auth_state: None,
        };
        let stripped = credential.without_access();
        assert_eq!(stripped.access_token, None);
        assert_eq!(stripped.expires_at_epoch_ms, None);
        assert_eq!(stripped.refresh_token.as_deref(), Some("r"));
    }

    #[test]
    fn test_attempt_expiry() {
        let attempt = AuthorizationAttempt::new("n".to_string());
        let later = attempt.created_at + Duration::minutes(5);
        assert!(!attempt.is_expired(attempt.created_at, Duration::minutes(5)));
        assert!(attempt.is_expired(later, Duration::minutes(5)));
    }

    #[test]
    fn test_serialized_field_names() {
        let credential = Credential {
            access_token: Some("a".to_string()),
            expires_at_epoch_ms: Some(1),
            ..Default::default()
        };
        let json = serde_json::to_value(&credential).unwrap();
        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["expiresAtEpochMs"], 1);
    }
}
