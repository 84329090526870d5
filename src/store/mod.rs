// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persistence collaborators: settings blob and document vault.

pub mod documents;
pub mod settings;

pub use documents::{
    parent_folder, DocumentHandle, DocumentStore, FsDocumentStore, MemoryDocumentStore,
};
pub use settings::{JsonFileSettingsStore, MemorySettingsStore, SettingsStore};
