// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Measurement Journal: body measurements into notes, synced with Google Fit
//!
//! This crate keeps a Google Fit OAuth credential alive and folds
//! measurements into journal and per-measurement documents without ever
//! duplicating an entry.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod time_utils;

use std::sync::Arc;

use config::Config;
use error::Result;
use services::{
    Browser, CallbackListener, DocumentMerger, FitnessService, GoogleFitClient, GoogleOAuthClient,
    LogNotifier, MeasurementRecorder, Notifier, SyncOrchestrator, SyncScheduler, SystemBrowser,
    TokenManager,
};
use store::{DocumentStore, FsDocumentStore, JsonFileSettingsStore, SettingsStore};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub settings: Arc<dyn SettingsStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub notifier: Arc<dyn Notifier>,
    pub tokens: Arc<TokenManager>,
    pub fitness: Arc<FitnessService>,
    pub merger: DocumentMerger,
    pub sync: Arc<SyncOrchestrator>,
    pub scheduler: SyncScheduler,
    pub recorder: MeasurementRecorder,
}

impl AppState {
    /// Wire every service on top of the given collaborators.
    pub async fn build(
        config: Config,
        settings: Arc<dyn SettingsStore>,
        documents: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        browser: Arc<dyn Browser>,
    ) -> Result<Self> {
        let tokens = Arc::new(
            TokenManager::load(
                GoogleOAuthClient::new(&config),
                settings.clone(),
                CallbackListener::on_port(config.callback_port),
                browser,
                notifier.clone(),
            )
            .await?,
        );

        let fitness = Arc::new(FitnessService::new(
            GoogleFitClient::from_config(&config),
            tokens.clone(),
        ));
        let merger = DocumentMerger::new(documents.clone());
        let sync = Arc::new(SyncOrchestrator::new(
            fitness.clone(),
            merger.clone(),
            settings.clone(),
            notifier.clone(),
        ));
        let scheduler = SyncScheduler::new(sync.clone());
        let recorder = MeasurementRecorder::new(
            merger.clone(),
            settings.clone(),
            Some(fitness.clone()),
            notifier.clone(),
        );

        Ok(Self {
            config,
            settings,
            documents,
            notifier,
            tokens,
            fitness,
            merger,
            sync,
            scheduler,
            recorder,
        })
    }

    /// Production wiring: JSON settings file, vault on disk, log notices,
    /// system browser.
    pub async fn from_config(config: Config) -> Result<Self> {
        let settings = Arc::new(JsonFileSettingsStore::new(&config.settings_path));
        let documents = Arc::new(FsDocumentStore::new(&config.vault_path));
        Self::build(
            config,
            settings,
            documents,
            Arc::new(LogNotifier),
            Arc::new(SystemBrowser),
        )
        .await
    }
}
