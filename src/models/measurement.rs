// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Measurement samples, unit systems, and value formatting.

use serde::{Deserialize, Serialize};

const KG_TO_LBS: f64 = 2.20462;
const CM_TO_IN: f64 = 0.393701;

/// One timestamped reading from the fitness provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementSample {
    pub timestamp_epoch_seconds: i64,
    pub weight_kg: Option<f64>,
    pub body_fat_percent: Option<f64>,
}

impl MeasurementSample {
    pub fn at(timestamp_epoch_seconds: i64) -> Self {
        Self {
            timestamp_epoch_seconds,
            weight_kg: None,
            body_fat_percent: None,
        }
    }

    /// Metric value stored for the given provider field.
    pub fn value_for(&self, field: FitField) -> Option<f64> {
        match field {
            FitField::Weight => self.weight_kg,
            FitField::BodyFat => self.body_fat_percent,
        }
    }
}

/// Sample fields that the provider can supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FitField {
    Weight,
    BodyFat,
}

/// Unit system values are displayed and entered in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementSystem {
    #[default]
    Metric,
    Imperial,
}

/// Physical quantity a measurement type records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitKind {
    Weight,
    Length,
    Percent,
}

impl UnitKind {
    /// Unit label shown next to values.
    pub fn label(self, system: MeasurementSystem) -> &'static str {
        match (self, system) {
            (UnitKind::Weight, MeasurementSystem::Metric) => "kg",
            (UnitKind::Weight, MeasurementSystem::Imperial) => "lbs",
            (UnitKind::Length, MeasurementSystem::Metric) => "cm",
            (UnitKind::Length, MeasurementSystem::Imperial) => "in",
            (UnitKind::Percent, _) => "%",
        }
    }

    /// Convert a metric value into the display system.
    pub fn from_metric(self, value: f64, system: MeasurementSystem) -> f64 {
        match (self, system) {
            (UnitKind::Weight, MeasurementSystem::Imperial) => value * KG_TO_LBS,
            (UnitKind::Length, MeasurementSystem::Imperial) => value * CM_TO_IN,
            _ => value,
        }
    }

    /// Convert a value entered in `system` back to metric.
    pub fn to_metric(self, value: f64, system: MeasurementSystem) -> f64 {
        match (self, system) {
            (UnitKind::Weight, MeasurementSystem::Imperial) => value / KG_TO_LBS,
            (UnitKind::Length, MeasurementSystem::Imperial) => value / CM_TO_IN,
            _ => value,
        }
    }
}

/// Values are always written with one decimal place.
pub fn format_value(value: f64) -> String {
    format!("{value:.1}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imperial_weight_rendering() {
        let lbs = UnitKind::Weight.from_metric(70.0, MeasurementSystem::Imperial);
        assert_eq!(format_value(lbs), "154.3");
        assert_eq!(UnitKind::Weight.label(MeasurementSystem::Imperial), "lbs");
    }

    #[test]
    fn test_metric_is_identity() {
        assert_eq!(
            UnitKind::Weight.from_metric(80.0, MeasurementSystem::Metric),
            80.0
        );
        assert_eq!(format_value(80.0), "80.0");
    }

    #[test]
    fn test_length_conversion_roundtrip_is_close() {
        let inches = UnitKind::Length.from_metric(100.0, MeasurementSystem::Imperial);
        assert_eq!(format_value(inches), "39.4");
        let back = UnitKind::Length.to_metric(inches, MeasurementSystem::Imperial);
        assert!((back - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_percent_never_converted() {
        assert_eq!(
            UnitKind::Percent.from_metric(21.5, MeasurementSystem::Imperial),
            21.5
        );
        assert_eq!(UnitKind::Percent.label(MeasurementSystem::Imperial), "%");
    }

    #[test]
    fn test_sample_field_lookup() {
        let sample = MeasurementSample {
            weight_kg: Some(70.0),
            ..MeasurementSample::at(10)
        };
        assert_eq!(sample.value_for(FitField::Weight), Some(70.0));
        assert_eq!(sample.value_for(FitField::BodyFat), None);
    }
}
