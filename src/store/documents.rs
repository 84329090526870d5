// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Hierarchical text document storage.
//!
//! Paths are vault-relative and `/`-separated (`Journal/2026-01-05.md`).

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// Handle to an existing document, returned by `create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    pub path: String,
}

impl DocumentHandle {
    /// Handle for a document known to exist.
    pub fn existing(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Read/create/update documents by path.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn exists(&self, path: &str) -> bool;
    async fn read(&self, path: &str) -> Result<String>;
    /// Fails if the document already exists or its folder is missing.
    async fn create(&self, path: &str, text: &str) -> Result<DocumentHandle>;
    async fn modify(&self, handle: &DocumentHandle, text: &str) -> Result<()>;
    /// Tolerates an already existing folder.
    async fn create_folder(&self, path: &str) -> Result<()>;
    /// Template document text, `None` if there is no such document.
    ///
    /// A path given without the `.md` extension also matches `<path>.md`.
    async fn read_template(&self, path: &str) -> Result<Option<String>>;
}

/// Parent folder of a vault path, `None` for documents at the root.
pub fn parent_folder(path: &str) -> Option<&str> {
    path.rsplit_once('/')
        .map(|(parent, _)| parent)
        .filter(|parent| !parent.is_empty())
}

fn template_candidates(path: &str) -> Vec<String> {
    let path = path.trim_matches('/');
    if path.ends_with(".md") {
        vec![path.to_string()]
    } else {
        vec![path.to_string(), format!("{path}.md")]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filesystem vault
// ─────────────────────────────────────────────────────────────────────────────

/// Documents stored as files below a vault root directory.
#[derive(Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a vault path onto the filesystem, refusing anything that would
    /// escape the vault root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || path.trim().is_empty() {
            return Err(Error::document(path, "path is outside the vault"));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(full) => tokio::fs::metadata(full)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn read(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(full)
            .await
            .map_err(|e| Error::document(path, e))
    }

    async fn create(&self, path: &str, text: &str) -> Result<DocumentHandle> {
        use tokio::io::AsyncWriteExt;

        let full = self.resolve(path)?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
            .map_err(|e| Error::document(path, e))?;
        file.write_all(text.as_bytes())
            .await
            .map_err(|e| Error::document(path, e))?;
        file.flush().await.map_err(|e| Error::document(path, e))?;

        tracing::debug!(path, "Document created");
        Ok(DocumentHandle::existing(path))
    }

    async fn modify(&self, handle: &DocumentHandle, text: &str) -> Result<()> {
        let full = self.resolve(&handle.path)?;
        if !tokio::fs::try_exists(&full).await.unwrap_or(false) {
            return Err(Error::document(&handle.path, "document does not exist"));
        }
        tokio::fs::write(full, text)
            .await
            .map_err(|e| Error::document(&handle.path, e))
    }

    async fn create_folder(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::create_dir(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(Error::document(path, e)),
        }
    }

    async fn read_template(&self, path: &str) -> Result<Option<String>> {
        for candidate in template_candidates(path) {
            let full = self.resolve(&candidate)?;
            match tokio::fs::read_to_string(&full).await {
                Ok(text) => return Ok(Some(text)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::document(candidate, e)),
            }
        }
        Ok(None)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryVault {
    documents: BTreeMap<String, String>,
    folders: BTreeSet<String>,
    failing: BTreeSet<String>,
}

/// In-memory document store with the same folder rules as the vault.
#[derive(Default)]
pub struct MemoryDocumentStore {
    vault: Mutex<MemoryVault>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document (its folders are created implicitly).
    pub fn insert(&self, path: &str, text: &str) {
        let mut vault = self.lock();
        let mut folder = parent_folder(path);
        while let Some(f) = folder {
            vault.folders.insert(f.to_string());
            folder = parent_folder(f);
        }
        vault.documents.insert(path.to_string(), text.to_string());
    }

    /// Current text of a document.
    pub fn contents(&self, path: &str) -> Option<String> {
        self.lock().documents.get(path).cloned()
    }

    /// All document paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.lock().documents.keys().cloned().collect()
    }

    pub fn has_folder(&self, path: &str) -> bool {
        self.lock().folders.contains(path)
    }

    /// Make create/modify of `path` fail.
    pub fn fail_writes_to(&self, path: &str) {
        self.lock().failing.insert(path.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryVault> {
        self.vault.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn exists(&self, path: &str) -> bool {
        self.lock().documents.contains_key(path)
    }

    async fn read(&self, path: &str) -> Result<String> {
        self.lock()
            .documents
            .get(path)
            .cloned()
            .ok_or_else(|| Error::document(path, "document does not exist"))
    }

    async fn create(&self, path: &str, text: &str) -> Result<DocumentHandle> {
        let mut vault = self.lock();
        if vault.failing.contains(path) {
            return Err(Error::document(path, "write rejected"));
        }
        if vault.documents.contains_key(path) {
            return Err(Error::document(path, "document already exists"));
        }
        if let Some(folder) = parent_folder(path) {
            if !vault.folders.contains(folder) {
                return Err(Error::document(path, "folder does not exist"));
            }
        }
        vault.documents.insert(path.to_string(), text.to_string());
        Ok(DocumentHandle::existing(path))
    }

    async fn modify(&self, handle: &DocumentHandle, text: &str) -> Result<()> {
        let mut vault = self.lock();
        if vault.failing.contains(&handle.path) {
            return Err(Error::document(&handle.path, "write rejected"));
        }
        match vault.documents.get_mut(&handle.path) {
            Some(existing) => {
                *existing = text.to_string();
                Ok(())
            }
            None => Err(Error::document(&handle.path, "document does not exist")),
        }
    }

    async fn create_folder(&self, path: &str) -> Result<()> {
        let mut vault = self.lock();
        if let Some(parent) = parent_folder(path) {
            if !vault.folders.contains(parent) {
                return Err(Error::document(path, "parent folder does not exist"));
            }
        }
        vault.folders.insert(path.to_string());
        Ok(())
    }

    async fn read_template(&self, path: &str) -> Result<Option<String>> {
        let vault = self.lock();
        Ok(template_candidates(path)
            .into_iter()
            .find_map(|candidate| vault.documents.get(&candidate).cloned()))
    }
}
