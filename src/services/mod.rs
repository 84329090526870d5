// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod browser;
pub mod callback;
pub mod chart;
pub mod fitness;
pub mod merger;
pub mod notifier;
pub mod oauth;
pub mod rate_limit;
pub mod recorder;
pub mod routing;
pub mod sync;
pub mod tokens;

pub use browser::{Browser, SystemBrowser};
pub use callback::{CallbackListener, CallbackOutcome, ListenerGuard};
pub use fitness::{FitCategory, FitnessService, GoogleFitClient};
pub use merger::{AppendOptions, DocumentMerger, EntryFields, MergeOutcome};
pub use notifier::{LogNotifier, Notifier, RecordingNotifier};
pub use oauth::{GoogleOAuthClient, TokenEndpointError};
pub use rate_limit::RateLimiter;
pub use recorder::{ManualEntry, MeasurementRecorder, RecordReport};
pub use routing::DocumentRouter;
pub use sync::{SyncOrchestrator, SyncReport, SyncScheduler};
pub use tokens::{RefreshPolicy, TokenManager};
