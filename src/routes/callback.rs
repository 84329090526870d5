// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local OAuth redirect endpoint.
//!
//! `GET /callback?code=..&state=..` resolves the pending authorization
//! outcome; anything else is a 404 and leaves the outcome untouched.

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Query, State},
    http::{Request, StatusCode},
    middleware,
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::error::{Error, Result};
use crate::middleware::add_security_headers;
use crate::services::callback::{resolve_outcome, CallbackOutcome};

const SUCCESS_PAGE: &str = "<!doctype html><html><head><title>Measurement Journal</title>\
<style>body{font-family:sans-serif;margin:4em auto;max-width:32em}</style></head>\
<body><h2>Authentication successful</h2><p>You can close this tab and return to your notes.</p>\
</body></html>";

const NOT_FOUND_PAGE: &str = "<!doctype html><html><head><title>Not found</title></head>\
<body><h2>Not found</h2></body></html>";

/// Shared handle the handler resolves the pending outcome through.
#[derive(Clone)]
pub struct CallbackState {
    outcome: Arc<watch::Sender<Option<CallbackOutcome>>>,
}

impl CallbackState {
    pub fn new(outcome: Arc<watch::Sender<Option<CallbackOutcome>>>) -> Self {
        Self { outcome }
    }
}

/// Build the redirect listener router.
pub fn router(state: CallbackState) -> Router {
    Router::new()
        .route("/callback", get(handle_callback))
        .fallback(not_found)
        .layer(middleware::from_fn(add_security_headers))
        .layer(
            // Path only: the query string carries the authorization code.
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::debug_span!("callback", method = %req.method(), path = %req.uri().path())
            }),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn handle_callback(
    State(state): State<CallbackState>,
    query: std::result::Result<Query<CallbackParams>, QueryRejection>,
) -> Result<Html<&'static str>> {
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            let reason = rejection.body_text();
            resolve_outcome(
                &state.outcome,
                CallbackOutcome::MissingParameters(reason.clone()),
            );
            return Err(Error::InvalidInput(reason));
        }
    };

    if let Some(provider_error) = params.error {
        let reason = format!("provider returned error: {provider_error}");
        resolve_outcome(
            &state.outcome,
            CallbackOutcome::MissingParameters(reason.clone()),
        );
        return Err(Error::CallbackRejected(reason));
    }

    let code = params.code.filter(|c| !c.is_empty());
    let nonce = params.state.filter(|s| !s.is_empty());

    match (code, nonce) {
        (Some(code), Some(nonce)) => {
            if !resolve_outcome(
                &state.outcome,
                CallbackOutcome::Received {
                    code,
                    state: nonce,
                },
            ) {
                tracing::debug!("Callback arrived after the attempt was already resolved");
            }
            Ok(Html(SUCCESS_PAGE))
        }
        _ => {
            let reason = "missing code or state parameter".to_string();
            resolve_outcome(
                &state.outcome,
                CallbackOutcome::MissingParameters(reason.clone()),
            );
            Err(Error::CallbackRejected(reason))
        }
    }
}

async fn not_found() -> (StatusCode, Html<&'static str>) {
    (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE))
}
