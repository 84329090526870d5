// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Manual measurement entry tests.

use measurement_journal::error::Error;
use measurement_journal::models::{MeasurementSystem, Settings};
use measurement_journal::services::{FitCategory, ManualEntry, MeasurementRecorder};

mod common;
use common::{valid_credential, Harness, HarnessOptions};

const T0: i64 = 1_767_614_400;

fn pushing(system: MeasurementSystem) -> Settings {
    let mut settings = Settings {
        measurement_system: system,
        ..Default::default()
    };
    settings.google_fit.enabled = true;
    settings.google_fit.push_manual_entries = true;
    settings
}

async fn harness(settings: Settings) -> Harness {
    Harness::start(HarnessOptions {
        credential: valid_credential(),
        settings,
        ..Default::default()
    })
    .await
}

fn recorder(h: &Harness) -> MeasurementRecorder {
    MeasurementRecorder::new(
        h.merger(),
        h.settings.clone(),
        Some(h.fitness.clone()),
        h.notifier.clone(),
    )
}

fn entry(values: &[(&str, f64)]) -> ManualEntry {
    ManualEntry {
        user: None,
        at_epoch_seconds: T0,
        values: values.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
    }
}

#[tokio::test]
async fn test_record_writes_every_value() {
    let h = harness(Settings::default()).await;

    let report = recorder(&h)
        .record(&entry(&[("Weight", 80.0), ("waist", 90.5)]))
        .await
        .unwrap();

    assert_eq!(report.appended, 4);
    assert!(!report.pushed, "push disabled by default");
    assert!(h.documents.contents("Measurements/Waist.md").is_some());
    assert!(h.mock.patches().is_empty());
}

#[tokio::test]
async fn test_unknown_measurement_writes_nothing() {
    let h = harness(Settings::default()).await;

    let err = recorder(&h)
        .record(&entry(&[("Weight", 80.0), ("Shoe size", 44.0)]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(h.documents.paths().is_empty());
}

#[tokio::test]
async fn test_non_finite_value_is_rejected() {
    let h = harness(Settings::default()).await;

    let err = recorder(&h)
        .record(&entry(&[("Weight", f64::NAN)]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_imperial_entry_is_pushed_in_metric() {
    let h = harness(pushing(MeasurementSystem::Imperial)).await;

    let report = recorder(&h)
        .record(&entry(&[("Weight", 154.3), ("Body fat", 20.0)]))
        .await
        .unwrap();

    assert!(report.pushed);
    let patches = h.mock.patches();
    assert_eq!(patches.len(), 2);
    assert_eq!(patches[0].0, FitCategory::Weight.write_source_id("123456789"));
    let kg = patches[0].1["point"][0]["value"][0]["fpVal"].as_f64().unwrap();
    assert!((kg - 69.99).abs() < 0.01, "got {kg}");
    assert_eq!(patches[1].1["point"][0]["value"][0]["fpVal"], 20.0);
}

#[tokio::test]
async fn test_other_users_are_not_pushed() {
    let h = harness(pushing(MeasurementSystem::Metric)).await;
    let mut manual = entry(&[("Weight", 60.0)]);
    manual.user = Some("Guest".to_string());

    let report = recorder(&h).record(&manual).await.unwrap();

    assert!(!report.pushed);
    assert!(h.mock.patches().is_empty());
    let file = h.documents.contents("Measurements/Weight.md").unwrap();
    assert!(file.contains("| Guest | 60.0 |"));
}

#[tokio::test]
async fn test_push_failure_keeps_documents() {
    let h = harness(pushing(MeasurementSystem::Metric)).await;
    h.mock
        .fail_patches_to(&FitCategory::Weight.write_source_id("123456789"));

    let report = recorder(&h)
        .record(&entry(&[("Weight", 80.0)]))
        .await
        .unwrap();

    assert!(!report.pushed);
    assert!(report.push_error.is_some());
    assert_eq!(report.appended, 2);
}

#[tokio::test]
async fn test_body_fat_alone_is_not_pushed() {
    let h = harness(pushing(MeasurementSystem::Metric)).await;

    let report = recorder(&h)
        .record(&entry(&[("Body fat", 21.0)]))
        .await
        .unwrap();

    assert!(!report.pushed);
    assert!(h.mock.patches().is_empty());
}
