// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and unit conversion.

use chrono::{DateTime, Local, SecondsFormat, TimeZone, Utc};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current wall-clock time in epoch seconds.
pub fn now_epoch_seconds() -> i64 {
    Utc::now().timestamp()
}

pub fn seconds_to_nanos(seconds: i64) -> i64 {
    seconds.saturating_mul(NANOS_PER_SECOND)
}

/// Truncates toward the start of the second.
pub fn nanos_to_seconds(nanos: i64) -> i64 {
    nanos.div_euclid(NANOS_PER_SECOND)
}

/// Epoch seconds as a timestamp in the machine's local zone.
///
/// Journal documents are named after the user's calendar day, not UTC.
pub fn local_datetime(epoch_seconds: i64) -> Option<DateTime<Local>> {
    Local.timestamp_opt(epoch_seconds, 0).single()
}

/// Format epoch seconds in local time using a chrono format string.
///
/// Invalid format strings fall back to ISO dates instead of panicking.
pub fn format_local(epoch_seconds: i64, format: &str) -> Option<String> {
    use std::fmt::Write;

    let local = local_datetime(epoch_seconds)?;
    let mut out = String::new();
    if write!(out, "{}", local.format(format)).is_err() {
        tracing::warn!(format, "Invalid date format, using %Y-%m-%d");
        return Some(local.format("%Y-%m-%d").to_string());
    }
    Some(out)
}
