// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Decide which documents a measurement value lands in, and how.

use crate::error::{Error, Result};
use crate::models::measurement::format_value;
use crate::models::{MeasurementType, Settings};
use crate::services::chart::ChartSpec;
use crate::services::merger::{render_entry, AppendOptions, EntryFields};
use crate::time_utils::format_local;

/// One entry bound for one document.
#[derive(Debug, Clone)]
pub struct RoutedEntry {
    pub path: String,
    pub entry: String,
    pub options: AppendOptions,
}

/// Maps measurement values onto journal and measurement-file entries
/// according to the current settings snapshot.
pub struct DocumentRouter<'a> {
    settings: &'a Settings,
}

impl<'a> DocumentRouter<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Placeholder values for one measurement. `display_value` is already
    /// in the active measurement system.
    pub fn fields(
        &self,
        at_epoch_seconds: i64,
        user: &str,
        measurement: &MeasurementType,
        display_value: f64,
    ) -> Result<EntryFields> {
        let date = format_local(at_epoch_seconds, "%Y-%m-%d")
            .ok_or_else(|| Error::InvalidInput(format!("invalid timestamp {at_epoch_seconds}")))?;
        let time = format_local(at_epoch_seconds, "%H:%M").unwrap_or_default();

        Ok(EntryFields {
            date,
            time,
            user: user.to_string(),
            measurement: measurement.name.clone(),
            value: format_value(display_value),
            unit: measurement
                .unit
                .label(self.settings.measurement_system)
                .to_string(),
        })
    }

    /// Entries for every enabled output kind.
    pub fn route(
        &self,
        at_epoch_seconds: i64,
        user: &str,
        measurement: &MeasurementType,
        display_value: f64,
    ) -> Result<Vec<RoutedEntry>> {
        let fields = self.fields(at_epoch_seconds, user, measurement, display_value)?;
        let mut routed = Vec::with_capacity(2);

        if self.settings.journal.enabled {
            routed.push(self.journal_entry(at_epoch_seconds, &fields));
        }
        if self.settings.measurement_files.enabled {
            routed.push(self.measurement_file_entry(&fields));
        }
        Ok(routed)
    }

    fn journal_entry(&self, at_epoch_seconds: i64, fields: &EntryFields) -> RoutedEntry {
        let journal = &self.settings.journal;
        let name = format_local(at_epoch_seconds, &journal.date_format)
            .unwrap_or_else(|| fields.date.clone());

        RoutedEntry {
            path: document_path(&journal.folder, &name),
            entry: render_entry(&journal.entry_template, fields),
            options: AppendOptions {
                use_callout: journal.use_callout,
                callout_header: journal.callout_header.clone(),
                template_path: journal.template_path.clone(),
                initial_content: format!("# {}\n", fields.date),
                template_fields: fields.clone(),
                chart: None,
            },
        }
    }

    fn measurement_file_entry(&self, fields: &EntryFields) -> RoutedEntry {
        let files = &self.settings.measurement_files;
        let value_header = format!("{} ({})", fields.measurement, fields.unit);

        RoutedEntry {
            path: document_path(&files.folder, &fields.measurement),
            entry: render_entry(&files.entry_template, fields),
            options: AppendOptions {
                use_callout: false,
                callout_header: String::new(),
                template_path: files.template_path.clone(),
                initial_content: format!(
                    "# {}\n\n| Date | User | Value ({}) |\n| --- | --- | --- |\n",
                    fields.measurement, fields.unit
                ),
                template_fields: fields.clone(),
                chart: files.chart.then(|| ChartSpec {
                    title: fields.measurement.clone(),
                    y_label: value_header,
                }),
            },
        }
    }
}

/// `<folder>/<name>.md`, or `<name>.md` for an empty folder.
pub fn document_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    let name = name.trim_matches('/');
    if folder.is_empty() {
        format!("{name}.md")
    } else {
        format!("{folder}/{name}.md")
    }
}
