//! Persisted configuration blob.
//!
//! Stored as one JSON document by the [`SettingsStore`](crate::store::SettingsStore).
//! Every field has a default so older or hand-edited files still load.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::credential::Credential;
use crate::models::measurement::{FitField, MeasurementSystem, UnitKind};

/// Top-level persisted settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Google Fit OAuth credential (only mutated by the token manager)
    pub credential: Credential,
    pub measurement_system: MeasurementSystem,
    pub users: Vec<UserProfile>,
    /// Name of the user provider data is attributed to
    pub default_user: Option<String>,
    pub measurements: Vec<MeasurementType>,
    #[validate(nested)]
    pub journal: JournalSettings,
    #[validate(nested)]
    pub measurement_files: MeasurementFileSettings,
    #[validate(nested)]
    pub google_fit: GoogleFitSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            credential: Credential::default(),
            measurement_system: MeasurementSystem::Metric,
            users: vec![UserProfile {
                name: "Me".to_string(),
            }],
            default_user: None,
            measurements: default_measurements(),
            journal: JournalSettings::default(),
            measurement_files: MeasurementFileSettings::default(),
            google_fit: GoogleFitSettings::default(),
        }
    }
}

impl Settings {
    /// User provider samples are written for.
    pub fn default_user_name(&self) -> String {
        self.default_user
            .clone()
            .or_else(|| self.users.first().map(|u| u.name.clone()))
            .unwrap_or_else(|| "Me".to_string())
    }

    /// Enabled measurement type with the given name (case-insensitive).
    pub fn measurement(&self, name: &str) -> Option<&MeasurementType> {
        self.measurements
            .iter()
            .find(|m| m.enabled && m.name.eq_ignore_ascii_case(name))
    }

    /// Enabled measurement type fed by the given provider field.
    pub fn measurement_for_field(&self, field: FitField) -> Option<&MeasurementType> {
        self.measurements
            .iter()
            .find(|m| m.enabled && m.fit_field == Some(field))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
}

/// A kind of body measurement the user records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementType {
    pub name: String,
    pub unit: UnitKind,
    /// Provider field that fills this measurement during sync
    #[serde(default)]
    pub fit_field: Option<FitField>,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

fn enabled() -> bool {
    true
}

fn default_measurements() -> Vec<MeasurementType> {
    let entry = |name: &str, unit, fit_field| MeasurementType {
        name: name.to_string(),
        unit,
        fit_field,
        enabled: true,
    };
    vec![
        entry("Weight", UnitKind::Weight, Some(FitField::Weight)),
        entry("Body fat", UnitKind::Percent, Some(FitField::BodyFat)),
        entry("Waist", UnitKind::Length, None),
        entry("Hips", UnitKind::Length, None),
        entry("Chest", UnitKind::Length, None),
    ]
}

/// Daily journal output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct JournalSettings {
    pub enabled: bool,
    #[validate(length(min = 1))]
    pub folder: String,
    /// chrono format string for the daily document name
    #[validate(length(min = 1))]
    pub date_format: String,
    /// Document used as the initial content of a new day
    pub template_path: Option<String>,
    #[validate(length(min = 1))]
    pub entry_template: String,
    pub use_callout: bool,
    #[validate(length(min = 1))]
    pub callout_header: String,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            folder: "Journal".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            template_path: None,
            entry_template: "- [{{user}}] {{measurement}}: {{value}} {{unit}}".to_string(),
            use_callout: false,
            callout_header: "> [!measurements] Measurements".to_string(),
        }
    }
}

/// One document per measurement type with a table and chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct MeasurementFileSettings {
    pub enabled: bool,
    #[validate(length(min = 1))]
    pub folder: String,
    pub template_path: Option<String>,
    #[validate(length(min = 1))]
    pub entry_template: String,
    pub chart: bool,
}

impl Default for MeasurementFileSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            folder: "Measurements".to_string(),
            template_path: None,
            entry_template: "| {{date}} | {{user}} | {{value}} |".to_string(),
            chart: true,
        }
    }
}

/// Provider sync behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct GoogleFitSettings {
    pub enabled: bool,
    /// 0 disables periodic sync
    #[validate(range(min = 0, max = 1440))]
    pub sync_interval_minutes: u64,
    #[validate(range(min = 1, max = 365))]
    pub lookback_days: i64,
    /// Push manually recorded weight/body fat to Google Fit
    pub push_manual_entries: bool,
}

impl Default for GoogleFitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            sync_interval_minutes: 0,
            lookback_days: 7,
            push_manual_entries: false,
        }
    }
}
