// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Settings persistence.
//!
//! The settings blob is the only persistence mechanism for the credential
//! and the user's templates/toggles.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use validator::Validate;

use crate::error::{Error, Result};
use crate::models::Settings;

/// Load/save the whole settings blob.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<Settings>;
    async fn save(&self, settings: &Settings) -> Result<()>;
}

/// Settings stored as pretty-printed JSON on disk.
pub struct JsonFileSettingsStore {
    path: PathBuf,
}

impl JsonFileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "settings.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SettingsStore for JsonFileSettingsStore {
    async fn load(&self) -> Result<Settings> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No settings file, using defaults");
                return Ok(Settings::default());
            }
            Err(e) => return Err(Error::Settings(format!("read failed: {e}"))),
        };

        let settings: Settings = serde_json::from_str(&raw)
            .map_err(|e| Error::Settings(format!("invalid settings file: {e}")))?;
        settings
            .validate()
            .map_err(|e| Error::Settings(format!("invalid settings: {e}")))?;
        Ok(settings)
    }

    /// Write to a sibling temp file, then rename over the target so a crash
    /// never leaves a truncated settings file behind.
    async fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Settings(format!("create settings dir failed: {e}")))?;
        }

        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| Error::Settings(format!("serialize failed: {e}")))?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| Error::Settings(format!("write failed: {e}")))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| Error::Settings(format!("rename failed: {e}")))?;

        Ok(())
    }
}

/// In-process settings store, for tests and embedding.
#[derive(Default)]
pub struct MemorySettingsStore {
    settings: Mutex<Settings>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
            ..Default::default()
        }
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every subsequent `save` fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<Settings> {
        Ok(self.settings.lock().await.clone())
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Settings("store unavailable".to_string()));
        }
        *self.settings.lock().await = settings.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
