// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test fixtures: a mock Google (OAuth + Fit) server and helpers for
//! wiring services against it.

#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use measurement_journal::config::Config;
use measurement_journal::models::{Credential, Settings};
use measurement_journal::services::{
    Browser, CallbackListener, DocumentMerger, FitnessService, GoogleFitClient, GoogleOAuthClient,
    RecordingNotifier, RefreshPolicy, SyncOrchestrator, TokenManager,
};
use measurement_journal::store::{MemoryDocumentStore, MemorySettingsStore};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ─────────────────────────────────────────────────────────────────────────────
// Mock Google server
// ─────────────────────────────────────────────────────────────────────────────

/// Recorded traffic and scripted responses.
#[derive(Default)]
pub struct MockState {
    token_responses: Mutex<VecDeque<(StatusCode, String)>>,
    token_requests: Mutex<Vec<HashMap<String, String>>>,
    token_delay: Mutex<Duration>,
    issued: Mutex<u32>,
    datasets: Mutex<HashMap<String, (StatusCode, String)>>,
    dataset_reads: Mutex<Vec<(String, Instant)>>,
    patches: Mutex<Vec<(String, Value)>>,
    failing_patches: Mutex<HashSet<String>>,
    source_creates: Mutex<Vec<Value>>,
}

pub struct MockGoogle {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    server: tokio::task::JoinHandle<()>,
}

impl Drop for MockGoogle {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl MockGoogle {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/token", post(token_endpoint))
            .route("/fit/users/me/dataSources", post(create_source))
            .route(
                "/fit/users/me/dataSources/{source}/datasets/{range}",
                get(read_dataset).patch(patch_dataset),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue the next token endpoint response.
    pub fn push_token_response(&self, status: StatusCode, body: impl Into<String>) {
        self.state
            .token_responses
            .lock()
            .unwrap()
            .push_back((status, body.into()));
    }

    pub fn set_token_delay(&self, delay: Duration) {
        *self.state.token_delay.lock().unwrap() = delay;
    }

    /// Form bodies of every token request so far.
    pub fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.state.token_requests.lock().unwrap().clone()
    }

    pub fn token_request_count(&self) -> usize {
        self.state.token_requests.lock().unwrap().len()
    }

    /// Serve `points` (`(epoch seconds, value)`) for a read source.
    pub fn set_points(&self, source_id: &str, points: &[(i64, f64)]) {
        let point: Vec<Value> = points
            .iter()
            .map(|(secs, value)| {
                json!({
                    "startTimeNanos": (secs * 1_000_000_000).to_string(),
                    "endTimeNanos": (secs * 1_000_000_000).to_string(),
                    "value": [{ "fpVal": value }],
                })
            })
            .collect();
        self.set_dataset_body(
            source_id,
            StatusCode::OK,
            json!({ "dataSourceId": source_id, "point": point }).to_string(),
        );
    }

    pub fn set_dataset_body(&self, source_id: &str, status: StatusCode, body: impl Into<String>) {
        self.state
            .datasets
            .lock()
            .unwrap()
            .insert(source_id.to_string(), (status, body.into()));
    }

    /// `(source id, arrival time)` of every dataset GET.
    pub fn dataset_reads(&self) -> Vec<(String, Instant)> {
        self.state.dataset_reads.lock().unwrap().clone()
    }

    pub fn patches(&self) -> Vec<(String, Value)> {
        self.state.patches.lock().unwrap().clone()
    }

    pub fn fail_patches_to(&self, source_id: &str) {
        self.state
            .failing_patches
            .lock()
            .unwrap()
            .insert(source_id.to_string());
    }

    pub fn source_creates(&self) -> Vec<Value> {
        self.state.source_creates.lock().unwrap().clone()
    }
}

async fn token_endpoint(
    State(state): State<Arc<MockState>>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, String) {
    let grant_type = form.get("grant_type").cloned().unwrap_or_default();
    state.token_requests.lock().unwrap().push(form);

    let delay = *state.token_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if let Some(scripted) = state.token_responses.lock().unwrap().pop_front() {
        return scripted;
    }

    let n = {
        let mut issued = state.issued.lock().unwrap();
        *issued += 1;
        *issued
    };
    let body = if grant_type == "authorization_code" {
        json!({
            "access_token": format!("access-{n}"),
            "expires_in": 3599,
            "refresh_token": format!("refresh-{n}"),
            "token_type": "Bearer",
        })
    } else {
        json!({
            "access_token": format!("access-{n}"),
            "expires_in": 3599,
            "token_type": "Bearer",
        })
    };
    (StatusCode::OK, body.to_string())
}

async fn read_dataset(
    State(state): State<Arc<MockState>>,
    Path((source, _range)): Path<(String, String)>,
) -> (StatusCode, String) {
    state
        .dataset_reads
        .lock()
        .unwrap()
        .push((source.clone(), Instant::now()));

    state
        .datasets
        .lock()
        .unwrap()
        .get(&source)
        .cloned()
        .unwrap_or_else(|| (StatusCode::OK, json!({ "point": [] }).to_string()))
}

async fn patch_dataset(
    State(state): State<Arc<MockState>>,
    Path((source, _range)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> StatusCode {
    if state.failing_patches.lock().unwrap().contains(&source) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    state.patches.lock().unwrap().push((source, body));
    StatusCode::OK
}

async fn create_source(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> StatusCode {
    let mut creates = state.source_creates.lock().unwrap();
    let name = body["dataType"]["name"].clone();
    let exists = creates.iter().any(|c| c["dataType"]["name"] == name);
    creates.push(body);
    if exists {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Browsers
// ─────────────────────────────────────────────────────────────────────────────

/// Query parameters of a URL, decoded.
pub fn query_params(url: &str) -> HashMap<String, String> {
    url.split_once('?')
        .map(|(_, query)| query)
        .unwrap_or("")
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            (
                k.to_string(),
                urlencoding::decode(v).map(|v| v.into_owned()).unwrap_or_default(),
            )
        })
        .collect()
}

/// Browser that immediately follows the authorization URL to the redirect,
/// as if the user clicked "Allow".
pub struct RedirectingBrowser {
    code: String,
    state_override: Option<String>,
    opened: Mutex<Vec<String>>,
}

impl RedirectingBrowser {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            state_override: None,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Send back a different `state` than the one issued.
    pub fn with_state(mut self, state: &str) -> Self {
        self.state_override = Some(state.to_string());
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl Browser for RedirectingBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        self.opened.lock().unwrap().push(url.to_string());

        let params = query_params(url);
        let redirect_uri = params["redirect_uri"].clone();
        let state = self
            .state_override
            .clone()
            .unwrap_or_else(|| params["state"].clone());
        let callback = format!(
            "{redirect_uri}?code={}&state={}",
            urlencoding::encode(&self.code),
            urlencoding::encode(&state)
        );

        tokio::spawn(async move {
            let _ = reqwest::get(&callback).await;
        });
        Ok(())
    }
}

/// Browser that records URLs and never calls back.
#[derive(Default)]
pub struct SilentBrowser {
    opened: Mutex<Vec<String>>,
}

impl SilentBrowser {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl Browser for SilentBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wiring
// ─────────────────────────────────────────────────────────────────────────────

/// A currently free loopback port.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn test_config(mock: &MockGoogle) -> Config {
    Config {
        callback_port: free_port(),
        auth_url: format!("{}/auth", mock.base_url()),
        token_url: format!("{}/token", mock.base_url()),
        fit_api_url: format!("{}/fit", mock.base_url()),
        ..Config::test_default()
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Access token valid for another hour.
pub fn valid_credential() -> Credential {
    Credential {
        access_token: Some("stored-access".to_string()),
        refresh_token: Some("stored-refresh".to_string()),
        expires_at_epoch_ms: Some(now_ms() + 60 * 60 * 1000),
        pending_auth_state: None,
    }
}

/// Access token inside the refresh margin.
pub fn expiring_credential() -> Credential {
    Credential {
        expires_at_epoch_ms: Some(now_ms() + 60 * 1000),
        ..valid_credential()
    }
}

pub fn refresh_only_credential() -> Credential {
    Credential {
        refresh_token: Some("stored-refresh".to_string()),
        ..Default::default()
    }
}

pub struct HarnessOptions {
    pub credential: Credential,
    pub settings: Settings,
    pub browser: Arc<dyn Browser>,
    pub listener_timeout: Duration,
    pub min_request_interval: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            credential: Credential::default(),
            settings: Settings::default(),
            browser: Arc::new(SilentBrowser::default()),
            listener_timeout: Duration::from_secs(10),
            min_request_interval: Duration::from_millis(5),
        }
    }
}

pub struct Harness {
    pub mock: MockGoogle,
    pub config: Config,
    pub settings: Arc<MemorySettingsStore>,
    pub documents: Arc<MemoryDocumentStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub tokens: Arc<TokenManager>,
    pub fitness: Arc<FitnessService>,
}

impl Harness {
    pub async fn start(options: HarnessOptions) -> Self {
        let mock = MockGoogle::start().await;
        let config = test_config(&mock);

        let mut settings = options.settings;
        settings.credential = options.credential;
        let settings = Arc::new(MemorySettingsStore::new(settings));
        let documents = Arc::new(MemoryDocumentStore::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let tokens = Arc::new(
            TokenManager::load(
                GoogleOAuthClient::new(&config),
                settings.clone(),
                CallbackListener::on_port(config.callback_port)
                    .with_timeout(options.listener_timeout),
                options.browser,
                notifier.clone(),
            )
            .await
            .unwrap()
            .with_refresh_policy(RefreshPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(20),
            }),
        );

        let fitness = Arc::new(
            FitnessService::new(GoogleFitClient::from_config(&config), tokens.clone())
                .with_min_interval(options.min_request_interval),
        );

        Self {
            mock,
            config,
            settings,
            documents,
            notifier,
            tokens,
            fitness,
        }
    }

    pub fn merger(&self) -> DocumentMerger {
        DocumentMerger::new(self.documents.clone())
    }

    pub fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::new(
            self.fitness.clone(),
            self.merger(),
            self.settings.clone(),
            self.notifier.clone(),
        )
    }

    /// Credential as currently persisted.
    pub async fn stored_credential(&self) -> Credential {
        use measurement_journal::store::SettingsStore;
        self.settings.load().await.unwrap().credential
    }
}
