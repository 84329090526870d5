// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod credential;
pub mod measurement;
pub mod settings;

pub use credential::{AuthorizationAttempt, Credential, TokenGrant};
pub use measurement::{FitField, MeasurementSample, MeasurementSystem, UnitKind};
pub use settings::{
    GoogleFitSettings, JournalSettings, MeasurementFileSettings, MeasurementType, Settings,
    UserProfile,
};
