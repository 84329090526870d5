// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Fit → document reconciliation.
//!
//! A provider failure aborts the run and is reported once. Document
//! failures are isolated: each is logged and recorded, and the remaining
//! entries are still processed.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::models::{FitField, MeasurementSample, Settings};
use crate::services::fitness::FitnessService;
use crate::services::merger::{DocumentMerger, MergeOutcome};
use crate::services::notifier::{Notifier, NOTICE_LONG, NOTICE_SHORT};
use crate::services::routing::DocumentRouter;
use crate::store::SettingsStore;
use crate::time_utils::now_epoch_seconds;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
/// Longest accepted sync interval, one day
const MAX_SYNC_INTERVAL_MINUTES: u64 = 24 * 60;

/// What a sync run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub samples: usize,
    pub appended: usize,
    pub skipped: usize,
    /// `path: reason` for every entry that could not be written
    pub failures: Vec<String>,
}

/// Pulls samples from Google Fit and folds them into documents.
pub struct SyncOrchestrator {
    fitness: Arc<FitnessService>,
    merger: DocumentMerger,
    settings: Arc<dyn SettingsStore>,
    notifier: Arc<dyn Notifier>,
}

impl SyncOrchestrator {
    pub fn new(
        fitness: Arc<FitnessService>,
        merger: DocumentMerger,
        settings: Arc<dyn SettingsStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            fitness,
            merger,
            settings,
            notifier,
        }
    }

    /// Sync the configured lookback window ending now.
    pub async fn run_recent(&self) -> Result<SyncReport> {
        let lookback_days = self.settings.load().await?.google_fit.lookback_days;
        let end = now_epoch_seconds();
        self.run_once(end - lookback_days * SECONDS_PER_DAY, end).await
    }

    /// Sync every sample within `[start, end]` (epoch seconds).
    pub async fn run_once(&self, start_epoch_seconds: i64, end_epoch_seconds: i64) -> Result<SyncReport> {
        let settings = self.settings.load().await?;

        let samples = match self
            .fitness
            .get_measurements(start_epoch_seconds, end_epoch_seconds)
            .await
        {
            Ok(samples) => samples,
            Err(e) => {
                tracing::error!(error = %e, "Google Fit sync aborted");
                self.notifier
                    .notify(&format!("Google Fit sync failed: {e}"), NOTICE_LONG);
                return Err(e);
            }
        };

        let mut report = SyncReport {
            samples: samples.len(),
            ..Default::default()
        };
        for sample in &samples {
            self.sync_sample(&settings, sample, &mut report).await;
        }

        tracing::info!(
            samples = report.samples,
            appended = report.appended,
            skipped = report.skipped,
            failures = report.failures.len(),
            "Google Fit sync finished"
        );

        if !report.failures.is_empty() {
            self.notifier.notify(
                &format!(
                    "Google Fit sync: {} entries could not be written",
                    report.failures.len()
                ),
                NOTICE_LONG,
            );
        } else if report.appended > 0 {
            self.notifier.notify(
                &format!("Google Fit sync: {} new entries", report.appended),
                NOTICE_SHORT,
            );
        }

        Ok(report)
    }

    async fn sync_sample(&self, settings: &Settings, sample: &MeasurementSample, report: &mut SyncReport) {
        let router = DocumentRouter::new(settings);
        let user = settings.default_user_name();

        for field in [FitField::Weight, FitField::BodyFat] {
            let Some(metric_value) = sample.value_for(field) else {
                continue;
            };
            let Some(measurement) = settings.measurement_for_field(field) else {
                continue;
            };
            let display_value = measurement
                .unit
                .from_metric(metric_value, settings.measurement_system);

            let routed = match router.route(
                sample.timestamp_epoch_seconds,
                &user,
                measurement,
                display_value,
            ) {
                Ok(routed) => routed,
                Err(e) => {
                    tracing::warn!(timestamp = sample.timestamp_epoch_seconds, error = %e, "Sample skipped");
                    report.failures.push(e.to_string());
                    continue;
                }
            };

            for target in routed {
                match self.merger.append(&target.path, &target.entry, &target.options).await {
                    Ok(MergeOutcome::Appended) => report.appended += 1,
                    Ok(MergeOutcome::Skipped) => report.skipped += 1,
                    Err(e) => {
                        tracing::warn!(path = %target.path, error = %e, "Document write failed");
                        report.failures.push(format!("{}: {e}", target.path));
                    }
                }
            }
        }
    }
}

/// Re-armable periodic sync. Only one timer exists at a time.
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            orchestrator,
            task: Mutex::new(None),
        }
    }

    /// Cancel the current timer and, unless `minutes` is 0, arm a new one.
    /// The first run happens one full interval from now.
    pub fn set_interval(&self, minutes: u64) {
        let mut task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = task.take() {
            previous.abort();
        }

        if minutes == 0 {
            tracing::info!("Periodic sync disabled");
            return;
        }

        let period = Duration::from_secs(minutes.min(MAX_SYNC_INTERVAL_MINUTES) * 60);
        let orchestrator = self.orchestrator.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = orchestrator.run_recent().await {
                    tracing::warn!(error = %e, "Scheduled sync failed");
                }
            }
        }));
        tracing::info!(minutes, "Periodic sync armed");
    }

    /// Run a sync right away, independent of the timer.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        self.orchestrator.run_recent().await
    }

    pub fn cancel(&self) {
        self.set_interval(0);
    }

    pub fn is_armed(&self) -> bool {
        self.task
            .lock()
            .map(|task| task.as_ref().is_some_and(|t| !t.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}
