// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User-visible notifications.

use std::sync::Mutex;
use std::time::Duration;

/// Fire-and-forget messages for the user. Never affects control flow.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, duration: Duration);
}

/// Default display time for short notices.
pub const NOTICE_SHORT: Duration = Duration::from_secs(4);
/// Display time for failures the user has to act on.
pub const NOTICE_LONG: Duration = Duration::from_secs(10);

/// Notifier that writes messages to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, duration: Duration) {
        tracing::info!(
            notice = true,
            duration_ms = duration.as_millis() as u64,
            "{message}"
        );
    }
}

/// Notifier that keeps every message, for tests and status displays.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, _duration: Duration) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}
