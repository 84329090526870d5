// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Fit REST client for body measurements.
//!
//! Handles:
//! - Time-windowed dataset reads for weight and body fat
//! - Point writes into our own raw data sources
//! - Rate limit detection (HTTP 429)
//! - Merging both categories into per-timestamp samples

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::MeasurementSample;
use crate::services::rate_limit::RateLimiter;
use crate::services::tokens::TokenManager;
use crate::time_utils::{nanos_to_seconds, seconds_to_nanos};

/// Stream name of the data sources we write to.
const DATA_STREAM_NAME: &str = "measurement-journal";

/// Measurement categories Google Fit stores separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitCategory {
    Weight,
    BodyFat,
}

impl FitCategory {
    pub const ALL: [FitCategory; 2] = [FitCategory::Weight, FitCategory::BodyFat];

    pub fn data_type_name(self) -> &'static str {
        match self {
            FitCategory::Weight => "com.google.weight",
            FitCategory::BodyFat => "com.google.body.fat.percentage",
        }
    }

    fn field_name(self) -> &'static str {
        match self {
            FitCategory::Weight => "weight",
            FitCategory::BodyFat => "percentage",
        }
    }

    /// Merged stream Google maintains across all writers.
    pub fn read_source_id(self) -> &'static str {
        match self {
            FitCategory::Weight => "derived:com.google.weight:com.google.android.gms:merge_weight",
            FitCategory::BodyFat => {
                "derived:com.google.body.fat.percentage:com.google.android.gms:merged"
            }
        }
    }

    /// Raw stream owned by this application.
    pub fn write_source_id(self, project_number: &str) -> String {
        format!(
            "raw:{}:{}:{}",
            self.data_type_name(),
            project_number,
            DATA_STREAM_NAME
        )
    }

    fn apply(self, sample: &mut MeasurementSample, value: f64) {
        match self {
            FitCategory::Weight => sample.weight_kg = Some(value),
            FitCategory::BodyFat => sample.body_fat_percent = Some(value),
        }
    }
}

/// One `(timestamp, value)` point from a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitPoint {
    pub timestamp_epoch_seconds: i64,
    pub value: f64,
}

/// Low-level Google Fit API client.
#[derive(Clone)]
pub struct GoogleFitClient {
    http: reqwest::Client,
    base_url: String,
    project_number: String,
}

impl GoogleFitClient {
    pub fn new(base_url: impl Into<String>, project_number: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_number: project_number.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.fit_api_url, &config.fit_project_number)
    }

    fn dataset_url(&self, source_id: &str, start_ns: i64, end_ns: i64) -> String {
        format!(
            "{}/users/me/dataSources/{}/datasets/{}-{}",
            self.base_url, source_id, start_ns, end_ns
        )
    }

    /// Read a category's points within `[start, end]` (epoch seconds).
    ///
    /// An unparseable body yields no points rather than an error.
    pub async fn read_points(
        &self,
        access_token: &str,
        category: FitCategory,
        start_epoch_seconds: i64,
        end_epoch_seconds: i64,
    ) -> Result<Vec<FitPoint>> {
        let url = self.dataset_url(
            category.read_source_id(),
            seconds_to_nanos(start_epoch_seconds),
            seconds_to_nanos(end_epoch_seconds),
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::ProviderRequest(e.to_string()))?;
        let response = check_response(response).await?;

        let body = response.text().await.unwrap_or_default();
        Ok(parse_dataset(category, &body))
    }

    /// Upsert one point into our raw source for `category`.
    pub async fn write_point(
        &self,
        access_token: &str,
        category: FitCategory,
        timestamp_epoch_seconds: i64,
        value: f64,
    ) -> Result<()> {
        let source_id = category.write_source_id(&self.project_number);
        let nanos = seconds_to_nanos(timestamp_epoch_seconds);
        let url = self.dataset_url(&source_id, nanos, nanos);

        let body = json!({
            "dataSourceId": source_id,
            "minStartTimeNs": nanos.to_string(),
            "maxEndTimeNs": nanos.to_string(),
            "point": [{
                "dataTypeName": category.data_type_name(),
                "startTimeNanos": nanos.to_string(),
                "endTimeNanos": nanos.to_string(),
                "value": [{ "fpVal": value }],
            }],
        });

        let response = self
            .http
            .patch(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ProviderRequest(e.to_string()))?;

        check_response(response).await?;
        Ok(())
    }

    /// Create our raw data source for `category`. An existing source (409)
    /// counts as success.
    pub async fn create_data_source(&self, access_token: &str, category: FitCategory) -> Result<()> {
        let url = format!("{}/users/me/dataSources", self.base_url);
        let body = json!({
            "dataStreamName": DATA_STREAM_NAME,
            "type": "raw",
            "application": { "name": "Measurement Journal" },
            "dataType": {
                "name": category.data_type_name(),
                "field": [{ "name": category.field_name(), "format": "floatPoint" }],
            },
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ProviderRequest(e.to_string()))?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            tracing::debug!(category = ?category, "Data source already exists");
            return Ok(());
        }
        check_response(response).await?;
        tracing::info!(category = ?category, "Created Google Fit data source");
        Ok(())
    }
}

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!("Google Fit rate limit hit (429)");
        return Err(Error::ProviderRequest(Error::PROVIDER_RATE_LIMIT.to_string()));
    }

    tracing::warn!(status = %status, body = %body, "Google Fit request failed");
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::ProviderRequest("access token was not accepted".to_string()));
    }
    Err(Error::ProviderRequest(format!("HTTP {}", status.as_u16())))
}

/// Extract points from a dataset body. Points without a timestamp or a
/// numeric value are skipped.
fn parse_dataset(category: FitCategory, body: &str) -> Vec<FitPoint> {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(category = ?category, error = %e, "Malformed dataset response");
            return Vec::new();
        }
    };

    let Some(points) = parsed.get("point").and_then(Value::as_array) else {
        tracing::debug!(category = ?category, "Dataset response has no points");
        return Vec::new();
    };

    points
        .iter()
        .filter_map(|point| {
            let nanos = int64_field(point.get("startTimeNanos")?)?;
            let value = point.get("value")?.get(0)?.get("fpVal")?.as_f64()?;
            Some(FitPoint {
                timestamp_epoch_seconds: nanos_to_seconds(nanos),
                value,
            })
        })
        .collect()
}

/// Google encodes int64 fields as JSON strings.
fn int64_field(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.parse().ok(),
        other => other.as_i64(),
    }
}

/// Merge per-category points into samples keyed by exact timestamp.
pub fn merge_points(categories: &[(FitCategory, Vec<FitPoint>)]) -> Vec<MeasurementSample> {
    let mut samples: BTreeMap<i64, MeasurementSample> = BTreeMap::new();
    for (category, points) in categories {
        for point in points {
            let sample = samples
                .entry(point.timestamp_epoch_seconds)
                .or_insert_with(|| MeasurementSample::at(point.timestamp_epoch_seconds));
            category.apply(sample, point.value);
        }
    }
    samples.into_values().collect()
}

/// High-level Google Fit access: valid token, rate limiting, and sample
/// normalization in front of every request.
pub struct FitnessService {
    client: GoogleFitClient,
    tokens: Arc<TokenManager>,
    limiter: RateLimiter,
    sources_ready: AtomicBool,
}

impl FitnessService {
    pub fn new(client: GoogleFitClient, tokens: Arc<TokenManager>) -> Self {
        Self {
            client,
            tokens,
            limiter: RateLimiter::default(),
            sources_ready: AtomicBool::new(false),
        }
    }

    /// Override the request spacing.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.limiter = RateLimiter::new(interval);
        self
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Fetch weight and body fat samples within `[start, end]`, ordered by
    /// timestamp.
    pub async fn get_measurements(
        &self,
        start_epoch_seconds: i64,
        end_epoch_seconds: i64,
    ) -> Result<Vec<MeasurementSample>> {
        if start_epoch_seconds > end_epoch_seconds {
            return Err(Error::InvalidInput(format!(
                "window start {start_epoch_seconds} is after end {end_epoch_seconds}"
            )));
        }

        let token = self.tokens.ensure_valid_token().await?;

        let mut categories = Vec::with_capacity(FitCategory::ALL.len());
        for category in FitCategory::ALL {
            self.limiter.acquire().await;
            let points = self
                .client
                .read_points(&token, category, start_epoch_seconds, end_epoch_seconds)
                .await?;
            tracing::debug!(category = ?category, count = points.len(), "Fetched dataset");
            categories.push((category, points));
        }

        let samples = merge_points(&categories);
        tracing::info!(
            start = start_epoch_seconds,
            end = end_epoch_seconds,
            samples = samples.len(),
            "Fetched Google Fit measurements"
        );
        Ok(samples)
    }

    /// Push one weight point and optionally a body fat point at the same
    /// timestamp.
    ///
    /// Not atomic: if body fat fails after weight was written, the weight
    /// stays and the error says so.
    pub async fn add_measurement(
        &self,
        timestamp_epoch_seconds: i64,
        weight_kg: f64,
        body_fat_percent: Option<f64>,
    ) -> Result<()> {
        let token = self.tokens.ensure_valid_token().await?;
        self.ensure_data_sources(&token).await?;

        self.limiter.acquire().await;
        self.client
            .write_point(&token, FitCategory::Weight, timestamp_epoch_seconds, weight_kg)
            .await?;

        if let Some(body_fat) = body_fat_percent {
            self.limiter.acquire().await;
            if let Err(e) = self
                .client
                .write_point(&token, FitCategory::BodyFat, timestamp_epoch_seconds, body_fat)
                .await
            {
                tracing::warn!(error = %e, "Body fat push failed after weight was saved");
                return Err(Error::ProviderRequest(format!(
                    "weight saved but body fat failed: {}",
                    provider_reason(&e)
                )));
            }
        }

        tracing::info!(timestamp = timestamp_epoch_seconds, "Pushed measurement to Google Fit");
        Ok(())
    }

    async fn ensure_data_sources(&self, token: &str) -> Result<()> {
        if self.sources_ready.load(Ordering::SeqCst) {
            return Ok(());
        }
        for category in FitCategory::ALL {
            self.limiter.acquire().await;
            self.client.create_data_source(token, category).await?;
        }
        self.sources_ready.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn provider_reason(error: &Error) -> String {
    match error {
        Error::ProviderRequest(reason) => reason.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dataset_reads_string_nanos() {
        let body = r#"{"point":[
            {"startTimeNanos":"1700000000000000000","value":[{"fpVal":70.5}]},
            {"startTimeNanos":1700000060000000000,"value":[{"fpVal":71}]}
        ]}"#;
        let points = parse_dataset(FitCategory::Weight, body);
        assert_eq!(
            points,
            vec![
                FitPoint {
                    timestamp_epoch_seconds: 1_700_000_000,
                    value: 70.5
                },
                FitPoint {
                    timestamp_epoch_seconds: 1_700_000_060,
                    value: 71.0
                },
            ]
        );
    }

    #[test]
    fn test_parse_dataset_skips_bad_points() {
        let body = r#"{"point":[
            {"startTimeNanos":"nope","value":[{"fpVal":70.5}]},
            {"startTimeNanos":"1700000000000000000","value":[]},
            {"startTimeNanos":"1700000000000000000","value":[{"intVal":3}]},
            {"startTimeNanos":"1700000120000000000","value":[{"fpVal":22.0}]}
        ]}"#;
        let points = parse_dataset(FitCategory::BodyFat, body);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp_epoch_seconds, 1_700_000_120);
    }

    #[test]
    fn test_parse_dataset_tolerates_garbage() {
        assert!(parse_dataset(FitCategory::Weight, "<html>").is_empty());
        assert!(parse_dataset(FitCategory::Weight, "{}").is_empty());
        assert!(parse_dataset(FitCategory::Weight, r#"{"point":"x"}"#).is_empty());
    }

    #[test]
    fn test_merge_points_by_timestamp() {
        let weights = vec![
            FitPoint {
                timestamp_epoch_seconds: 100,
                value: 70.0,
            },
            FitPoint {
                timestamp_epoch_seconds: 200,
                value: 71.0,
            },
        ];
        let body_fat = vec![
            FitPoint {
                timestamp_epoch_seconds: 100,
                value: 20.0,
            },
            FitPoint {
                timestamp_epoch_seconds: 50,
                value: 19.0,
            },
        ];

        let samples = merge_points(&[
            (FitCategory::Weight, weights),
            (FitCategory::BodyFat, body_fat),
        ]);

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].timestamp_epoch_seconds, 50);
        assert_eq!(samples[0].weight_kg, None);
        assert_eq!(samples[0].body_fat_percent, Some(19.0));
        assert_eq!(samples[1].weight_kg, Some(70.0));
        assert_eq!(samples[1].body_fat_percent, Some(20.0));
        assert_eq!(samples[2].body_fat_percent, None);
    }

    #[test]
    fn test_source_ids() {
        assert_eq!(
            FitCategory::Weight.write_source_id("42"),
            "raw:com.google.weight:42:measurement-journal"
        );
        let client = GoogleFitClient::new("http://fit/", "42");
        assert_eq!(
            client.dataset_url("src", 1, 2),
            "http://fit/users/me/dataSources/src/datasets/1-2"
        );
    }
}
