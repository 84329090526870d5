// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Manually entered measurements.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{FitField, MeasurementType};
use crate::services::fitness::FitnessService;
use crate::services::merger::{DocumentMerger, MergeOutcome};
use crate::services::notifier::{Notifier, NOTICE_LONG, NOTICE_SHORT};
use crate::services::routing::DocumentRouter;
use crate::store::SettingsStore;

/// Values entered by the user, in the active measurement system.
#[derive(Debug, Clone)]
pub struct ManualEntry {
    /// Defaults to the configured default user
    pub user: Option<String>,
    pub at_epoch_seconds: i64,
    /// `(measurement name, value)` pairs
    pub values: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordReport {
    pub appended: usize,
    pub skipped: usize,
    pub failures: Vec<String>,
    /// Whether weight/body fat were sent to Google Fit
    pub pushed: bool,
    pub push_error: Option<String>,
}

pub struct MeasurementRecorder {
    merger: DocumentMerger,
    settings: Arc<dyn SettingsStore>,
    fitness: Option<Arc<FitnessService>>,
    notifier: Arc<dyn Notifier>,
}

impl MeasurementRecorder {
    pub fn new(
        merger: DocumentMerger,
        settings: Arc<dyn SettingsStore>,
        fitness: Option<Arc<FitnessService>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            merger,
            settings,
            fitness,
            notifier,
        }
    }

    /// Write every value to its documents and optionally push weight and
    /// body fat to Google Fit.
    ///
    /// Unknown measurement names and non-finite values reject the whole
    /// entry before anything is written.
    pub async fn record(&self, entry: &ManualEntry) -> Result<RecordReport> {
        let settings = self.settings.load().await?;

        let mut resolved: Vec<(&MeasurementType, f64)> = Vec::with_capacity(entry.values.len());
        for (name, value) in &entry.values {
            let measurement = settings
                .measurement(name)
                .ok_or_else(|| Error::InvalidInput(format!("unknown measurement '{name}'")))?;
            if !value.is_finite() {
                return Err(Error::InvalidInput(format!("invalid value for {name}")));
            }
            resolved.push((measurement, *value));
        }
        if resolved.is_empty() {
            return Err(Error::InvalidInput("no measurement values given".to_string()));
        }

        let default_user = settings.default_user_name();
        let user = entry.user.clone().unwrap_or_else(|| default_user.clone());
        let router = DocumentRouter::new(&settings);
        let mut report = RecordReport::default();

        for (measurement, value) in &resolved {
            for target in router.route(entry.at_epoch_seconds, &user, measurement, *value)? {
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

        let push_enabled = settings.google_fit.enabled && settings.google_fit.push_manual_entries;
        if push_enabled && user == default_user {
            if let Some(fitness) = &self.fitness {
                let metric = |field: FitField| {
                    resolved
                        .iter()
                        .find(|(m, _)| m.fit_field == Some(field))
                        .map(|(m, v)| m.unit.to_metric(*v, settings.measurement_system))
                };

                match metric(FitField::Weight) {
                    Some(weight_kg) => {
                        match fitness
                            .add_measurement(entry.at_epoch_seconds, weight_kg, metric(FitField::BodyFat))
                            .await
                        {
                            Ok(()) => report.pushed = true,
                            Err(e) => {
                                tracing::warn!(error = %e, "Google Fit push failed");
                                self.notifier.notify(&e.to_string(), NOTICE_LONG);
                                report.push_error = Some(e.to_string());
                            }
                        }
                    }
                    None => tracing::debug!("No weight in entry, nothing to push"),
                }
            }
        }

        if report.failures.is_empty() {
            self.notifier.notify("Measurements saved", NOTICE_SHORT);
        } else {
            self.notifier.notify(
                &format!("{} entries could not be written", report.failures.len()),
                NOTICE_LONG,
            );
        }
        Ok(report)
    }
}
