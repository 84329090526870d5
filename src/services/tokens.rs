// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth credential lifecycle: interactive authorization, refresh, and the
//! "valid token before every provider call" guarantee.
//!
//! The manager owns the only live copy of the [`Credential`]. Every change
//! produces a full snapshot that is written to the settings store first and
//! only then published to subscribers, so a failed save leaves the previous
//! state in place.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::sync::{watch, Mutex};

use crate::error::{Error, Result};
use crate::models::{AuthorizationAttempt, Credential};
use crate::services::browser::Browser;
use crate::services::callback::{CallbackListener, CallbackOutcome};
use crate::services::notifier::{Notifier, NOTICE_LONG, NOTICE_SHORT};
use crate::services::oauth::{GoogleOAuthClient, TokenEndpointError};
use crate::store::SettingsStore;
use crate::time_utils::now_epoch_ms;

const NONCE_BYTES: usize = 32;

/// How hard a refresh is retried on transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Total refresh requests per `ensure_valid_token` call
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_secs(1),
        }
    }
}

/// Result of one refresh sequence, replayed to callers that queued behind it.
#[derive(Debug, Clone)]
enum RefreshOutcome {
    Token(String),
    AuthRequired,
    Transient(String),
    Settings(String),
}

impl RefreshOutcome {
    fn from_result(result: &Result<String>) -> Self {
        match result {
            Ok(token) => RefreshOutcome::Token(token.clone()),
            Err(Error::AuthRequired) => RefreshOutcome::AuthRequired,
            Err(Error::TransientRefresh(reason)) => RefreshOutcome::Transient(reason.clone()),
            Err(other) => RefreshOutcome::Settings(other.to_string()),
        }
    }

    fn into_result(self) -> Result<String> {
        match self {
            RefreshOutcome::Token(token) => Ok(token),
            RefreshOutcome::AuthRequired => Err(Error::AuthRequired),
            RefreshOutcome::Transient(reason) => Err(Error::TransientRefresh(reason)),
            RefreshOutcome::Settings(reason) => Err(Error::Settings(reason)),
        }
    }
}

#[derive(Default)]
struct RefreshSlot {
    last: Option<RefreshOutcome>,
}

/// Owner of the Google Fit credential.
pub struct TokenManager {
    oauth: GoogleOAuthClient,
    settings: Arc<dyn SettingsStore>,
    browser: Arc<dyn Browser>,
    notifier: Arc<dyn Notifier>,
    listener: CallbackListener,
    policy: RefreshPolicy,
    credential: watch::Sender<Credential>,
    /// Serializes load-modify-save of the settings blob.
    persist_lock: Mutex<()>,
    /// Held for the whole duration of a refresh sequence.
    refresh_slot: Mutex<RefreshSlot>,
    /// Bumped each time a refresh sequence finishes.
    refresh_generation: AtomicU64,
    attempt: std::sync::Mutex<Option<AuthorizationAttempt>>,
}

impl TokenManager {
    /// Create a manager seeded with the credential currently in `settings`.
    pub async fn load(
        oauth: GoogleOAuthClient,
        settings: Arc<dyn SettingsStore>,
        listener: CallbackListener,
        browser: Arc<dyn Browser>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let stored = settings.load().await?.credential;
        if !stored.is_consistent() {
            tracing::warn!("Stored credential has an access token without expiry, it will be refreshed");
        }

        Ok(Self {
            oauth,
            settings,
            browser,
            notifier,
            listener,
            policy: RefreshPolicy::default(),
            credential: watch::Sender::new(stored),
            persist_lock: Mutex::new(()),
            refresh_slot: Mutex::new(RefreshSlot::default()),
            refresh_generation: AtomicU64::new(0),
            attempt: std::sync::Mutex::new(None),
        })
    }

    pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Read-only snapshot of the current credential.
    pub fn credential_snapshot(&self) -> Credential {
        self.credential.borrow().clone()
    }

    /// Receive every credential change after it has been persisted.
    pub fn subscribe(&self) -> watch::Receiver<Credential> {
        self.credential.subscribe()
    }

    /// Whether any token is stored. A stored token may still be rejected.
    pub fn is_authenticated(&self) -> bool {
        !self.credential.borrow().has_no_tokens()
    }

    pub fn listener(&self) -> &CallbackListener {
        &self.listener
    }

    // ─── Valid token guarantee ───────────────────────────────────────────────

    /// Return an access token that is valid for at least the refresh margin.
    ///
    /// 1. No tokens at all: `AuthRequired` without touching the network
    /// 2. Current token outside the margin: returned as is
    /// 3. Otherwise take the refresh slot; callers that queued behind a
    ///    refresh that finished meanwhile get that refresh's outcome
    /// 4. No refresh token: drop the access token, `AuthRequired`
    /// 5. Refresh with retry; a rejected grant clears the whole credential
    pub async fn ensure_valid_token(&self) -> Result<String> {
        let generation = self.refresh_generation.load(Ordering::SeqCst);
        let current = self.credential_snapshot();

        if current.has_no_tokens() {
            return Err(Error::AuthRequired);
        }
        if let Some(token) = usable_access_token(&current) {
            return Ok(token);
        }

        let mut slot = self.refresh_slot.lock().await;

        if self.refresh_generation.load(Ordering::SeqCst) != generation {
            if let Some(outcome) = slot.last.clone() {
                tracing::debug!("Joined refresh that completed while waiting");
                return outcome.into_result();
            }
        }

        let result = self.refresh_locked().await;

        slot.last = Some(RefreshOutcome::from_result(&result));
        self.refresh_generation.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Refresh sequence. Caller holds the refresh slot.
    async fn refresh_locked(&self) -> Result<String> {
        // Double-check: the credential may have changed while we waited.
        let current = self.credential_snapshot();
        if current.has_no_tokens() {
            return Err(Error::AuthRequired);
        }
        if let Some(token) = usable_access_token(&current) {
            return Ok(token);
        }

        let Some(refresh_token) = current.refresh_token.clone() else {
            tracing::info!("Access token expired and no refresh token stored");
            self.persist(|c| c.without_access()).await?;
            return Err(Error::AuthRequired);
        };

        tracing::info!("Access token expired, refreshing");

        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match self.oauth.refresh(&refresh_token).await {
                Ok(grant) => {
                    let updated = self
                        .persist(|c| c.with_refreshed(&grant, now_epoch_ms()))
                        .await?;
                    tracing::info!(
                        expires_at = ?updated.expires_at(),
                        "Access token refreshed"
                    );
                    return Ok(grant.access_token);
                }
                Err(TokenEndpointError::Rejected(code)) => {
                    tracing::warn!(error = %code, "Refresh token rejected, clearing credential");
                    self.persist(|_| Credential::default()).await?;
                    self.notifier.notify(
                        "Google Fit access was revoked. Please connect again.",
                        NOTICE_LONG,
                    );
                    return Err(Error::AuthRequired);
                }
                Err(TokenEndpointError::Transient(reason)) => {
                    tracing::warn!(attempt, max_attempts, reason = %reason, "Token refresh failed");
                    last_error = reason;
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.delay).await;
                    }
                }
            }
        }

        Err(Error::TransientRefresh(last_error))
    }

    // ─── Interactive authorization ───────────────────────────────────────────

    /// Run the loopback authorization-code flow.
    ///
    /// Succeeds only once the new credential has been saved and read back.
    pub async fn authenticate(&self) -> Result<()> {
        let attempt = self.begin_attempt()?;

        self.persist(|c| c.with_pending_state(&attempt.nonce)).await?;

        let guard = self.listener.acquire().await?;
        let url = self.oauth.authorize_url(&attempt.nonce);

        if let Err(e) = self.browser.open(&url) {
            tracing::warn!(error = %e, "Could not open browser");
            self.notifier.notify(
                &format!("Open this URL to connect Google Fit: {url}"),
                NOTICE_LONG,
            );
        }
        tracing::info!(redirect_uri = %self.oauth.redirect_uri(), "Waiting for authorization redirect");

        let outcome = guard.wait_for_callback().await?;
        let result = match outcome {
            CallbackOutcome::Received { code, state } => {
                self.complete_authentication(&code, &state).await
            }
            CallbackOutcome::TimedOut => Err(Error::AuthTimeout),
            CallbackOutcome::MissingParameters(reason) => Err(Error::CallbackRejected(reason)),
            CallbackOutcome::Closed => Err(Error::CallbackListener(
                "listener closed before the redirect arrived".to_string(),
            )),
        };
        drop(guard);

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Authorization failed");
            self.notifier.notify(&e.to_string(), NOTICE_LONG);
        }
        result
    }

    /// Start a flow whose redirect is pasted back by hand; returns the URL
    /// to visit. The nonce is persisted so the flow survives restarts.
    ///
    /// Fails with [`Error::AuthInProgress`] while an interactive flow is
    /// waiting, since its nonce would otherwise be overwritten.
    pub async fn begin_manual_authentication(&self) -> Result<String> {
        let attempt = self.begin_attempt()?;
        self.persist(|c| c.with_pending_state(&attempt.nonce)).await?;
        Ok(self.oauth.authorize_url(&attempt.nonce))
    }

    /// Verify `state` and exchange `code` for tokens.
    pub async fn complete_authentication(&self, code: &str, state: &str) -> Result<()> {
        let expected = self.credential_snapshot().pending_auth_state;
        let matches = expected
            .as_deref()
            .is_some_and(|nonce| bool::from(nonce.as_bytes().ct_eq(state.as_bytes())));
        if !matches {
            tracing::warn!(
                pending = expected.is_some(),
                "Authorization state does not match the issued nonce"
            );
            return Err(Error::AuthStateMismatch);
        }

        let grant = self.oauth.exchange_code(code).await.map_err(|e| {
            tracing::warn!(error = %e, "Authorization code exchange failed");
            Error::TokenExchange(e.to_string())
        })?;

        self.persist(|c| c.with_grant(&grant, now_epoch_ms()))
            .await?;

        let stored = self.settings.load().await?.credential;
        if stored.access_token.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Settings(
                "credential was not persisted after authorization".to_string(),
            ));
        }

        tracing::info!(
            has_refresh_token = stored.refresh_token.is_some(),
            "Google Fit authorization complete"
        );
        self.notifier.notify("Connected to Google Fit", NOTICE_SHORT);
        Ok(())
    }

    /// Forget all tokens.
    pub async fn sign_out(&self) -> Result<()> {
        self.persist(|_| Credential::default()).await?;
        tracing::info!("Signed out of Google Fit");
        self.notifier.notify("Disconnected from Google Fit", NOTICE_SHORT);
        Ok(())
    }

    fn begin_attempt(&self) -> Result<AttemptGuard<'_>> {
        let max_age = chrono::Duration::from_std(self.listener.timeout())
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let mut slot = self
            .attempt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(existing) = slot.as_ref() {
            if !existing.is_expired(chrono::Utc::now(), max_age) {
                return Err(Error::AuthInProgress);
            }
            tracing::debug!("Replacing expired authorization attempt");
        }

        let nonce = generate_nonce()?;
        *slot = Some(AuthorizationAttempt::new(nonce.clone()));
        Ok(AttemptGuard {
            slot: &self.attempt,
            nonce,
        })
    }

    // ─── Persistence ─────────────────────────────────────────────────────────

    /// Apply `update` to the current credential, save, then publish.
    async fn persist<F>(&self, update: F) -> Result<Credential>
    where
        F: FnOnce(&Credential) -> Credential,
    {
        let _guard = self.persist_lock.lock().await;

        let next = update(&self.credential_snapshot());
        if !next.is_consistent() {
            return Err(Error::Internal(anyhow::anyhow!(
                "refusing to store an access token without expiry"
            )));
        }

        let mut settings = self.settings.load().await?;
        settings.credential = next.clone();
        self.settings.save(&settings).await?;

        self.credential.send_replace(next.clone());
        Ok(next)
    }
}

fn usable_access_token(credential: &Credential) -> Option<String> {
    if credential.needs_refresh(now_epoch_ms()) {
        None
    } else {
        credential.access_token.clone()
    }
}

/// Random URL-safe nonce for the `state` parameter.
fn generate_nonce() -> Result<String> {
    let mut bytes = [0u8; NONCE_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| Error::Internal(anyhow::anyhow!("system random generator failed")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Clears the live attempt when the flow ends, however it ends.
struct AttemptGuard<'a> {
    slot: &'a std::sync::Mutex<Option<AuthorizationAttempt>>,
    nonce: String,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_ref().is_some_and(|a| a.nonce == self.nonce) {
            *slot = None;
        }
    }
}
