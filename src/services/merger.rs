// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Idempotent append of rendered entries into user-editable documents.
//!
//! Documents are treated as append-only: the only rewrite is the chart
//! block, which is always replaced wholesale. Deduplication is purely
//! textual, so two different facts that render to the same line are
//! considered the same entry.

use std::sync::Arc;

use crate::error::Result;
use crate::services::chart::{
    find_chart_block, is_table_line, join_lines, render_chart, strip_chart_block, table_points,
    ChartPoint, ChartSpec,
};
use crate::store::{parent_folder, DocumentHandle, DocumentStore};

/// Values substituted into `{{placeholder}}`s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFields {
    pub date: String,
    pub time: String,
    pub user: String,
    pub measurement: String,
    pub value: String,
    pub unit: String,
}

impl EntryFields {
    fn get(&self, key: &str) -> Option<&str> {
        match key {
            "date" => Some(&self.date),
            "time" => Some(&self.time),
            "user" => Some(&self.user),
            "measurement" => Some(&self.measurement),
            "value" => Some(&self.value),
            "unit" => Some(&self.unit),
            _ => None,
        }
    }
}

/// How an entry is folded into its document.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Entries live inside a `>` callout under `callout_header`
    pub use_callout: bool,
    pub callout_header: String,
    /// Template document for new documents
    pub template_path: Option<String>,
    /// Content of a new document when there is no usable template
    pub initial_content: String,
    /// Fields available to the template document
    pub template_fields: EntryFields,
    /// Re-render the chart block from the table after appending
    pub chart: Option<ChartSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Appended,
    /// An equivalent entry was already present; nothing was written.
    Skipped,
}

/// Replace `{{key}}` placeholders. Unknown placeholders stay verbatim.
pub fn render_entry(template: &str, fields: &EntryFields) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let key = after_open[..close].trim();
                match fields.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[open..open + 2 + close + 2]),
                }
                rest = &after_open[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Strip callout, list, and checkbox decoration, then trim.
pub fn normalize_line(line: &str) -> &str {
    let mut text = line.trim_start();

    while let Some(rest) = text.strip_prefix('>') {
        text = rest.trim_start();
    }

    if let Some(rest) = strip_list_marker(text) {
        text = rest.trim_start();
    }

    for checkbox in ["[ ]", "[x]", "[X]"] {
        if let Some(rest) = text.strip_prefix(checkbox) {
            text = rest.trim_start();
            break;
        }
    }

    text.trim()
}

fn strip_list_marker(text: &str) -> Option<&str> {
    for bullet in ['-', '*', '+'] {
        if let Some(rest) = text.strip_prefix(bullet) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return Some(rest);
            }
        }
    }

    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 {
        let rest = &text[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return Some(rest);
            }
        }
    }
    None
}

/// Whether every non-empty line of `candidate` already appears in
/// `document`, ignoring decoration.
pub fn has_equivalent_entry(document: &str, candidate: &str) -> bool {
    let wanted: Vec<&str> = candidate
        .lines()
        .map(normalize_line)
        .filter(|l| !l.is_empty())
        .collect();
    if wanted.is_empty() {
        return false;
    }

    let present: std::collections::HashSet<&str> = document.lines().map(normalize_line).collect();
    wanted.iter().all(|line| present.contains(line))
}

/// Replace the chart block with one rendered from `points`, or insert it
/// after the last table. No points removes the block.
pub fn merge_chart_block(document: &str, points: &[ChartPoint], spec: &ChartSpec) -> String {
    if points.is_empty() {
        return strip_chart_block(document);
    }

    let block = render_chart(spec, points);
    let lines: Vec<&str> = document.lines().collect();

    if let Some((start, end)) = find_chart_block(&lines) {
        let mut out: Vec<&str> = lines[..start].to_vec();
        out.extend(block.lines());
        out.extend_from_slice(&lines[end + 1..]);
        return join_lines(&out);
    }

    let mut out: Vec<&str>;
    match lines.iter().rposition(|l| is_table_line(l)) {
        Some(last_row) => {
            out = lines[..=last_row].to_vec();
            out.push("");
            out.extend(block.lines());

            let rest = &lines[last_row + 1..];
            if let Some(first) = rest.iter().position(|l| !l.trim().is_empty()) {
                out.push("");
                out.extend_from_slice(&rest[first..]);
            }
        }
        None => {
            let content_end = lines
                .iter()
                .rposition(|l| !l.trim().is_empty())
                .map_or(0, |i| i + 1);
            out = lines[..content_end].to_vec();
            if !out.is_empty() {
                out.push("");
            }
            out.extend(block.lines());
        }
    }
    join_lines(&out)
}

/// Append `entry` after the last line of the callout under `header`,
/// creating the callout at the end of the document if it is missing.
/// A blank header names no callout, so the entry is appended plainly.
fn append_in_callout(document: &str, header: &str, entry: &str) -> String {
    if header.trim().is_empty() {
        return append_plain(document, entry);
    }
    let quoted: Vec<String> = entry.lines().map(|l| format!("> {l}")).collect();
    let lines: Vec<&str> = document.lines().collect();

    if let Some(header_at) = lines.iter().position(|l| l.trim() == header.trim()) {
        let mut insert_at = header_at + 1;
        while insert_at < lines.len() && lines[insert_at].trim_start().starts_with('>') {
            insert_at += 1;
        }
        let mut out: Vec<&str> = lines[..insert_at].to_vec();
        out.extend(quoted.iter().map(String::as_str));
        out.extend_from_slice(&lines[insert_at..]);
        return join_lines(&out);
    }

    let body = document.trim_end();
    let mut out = String::with_capacity(body.len() + header.len() + entry.len() + 8);
    out.push_str(body);
    if !body.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(header.trim());
    for line in quoted {
        out.push('\n');
        out.push_str(&line);
    }
    out.push('\n');
    out
}

/// Plain trailing entry, separated by exactly one newline.
fn append_plain(document: &str, entry: &str) -> String {
    let body = document.trim_end_matches(['\n', '\r']);
    if body.is_empty() {
        format!("{entry}\n")
    } else {
        format!("{body}\n{entry}\n")
    }
}

/// Folds entries into documents through a [`DocumentStore`].
#[derive(Clone)]
pub struct DocumentMerger {
    store: Arc<dyn DocumentStore>,
}

impl DocumentMerger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create every folder from the root down to `path`.
    pub async fn ensure_folder(&self, path: &str) -> Result<()> {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            self.store.create_folder(&current).await?;
        }
        Ok(())
    }

    /// Append `entry` to the document at `path` unless an equivalent entry
    /// is already there.
    pub async fn append(
        &self,
        path: &str,
        entry: &str,
        options: &AppendOptions,
    ) -> Result<MergeOutcome> {
        let existed = self.store.exists(path).await;
        let original = if existed {
            self.store.read(path).await?
        } else {
            self.initial_content(path, options).await
        };

        let base = match options.chart {
            Some(_) => strip_chart_block(&original),
            None => original,
        };

        if has_equivalent_entry(&base, entry) {
            tracing::debug!(path, "Equivalent entry present, skipping");
            return Ok(MergeOutcome::Skipped);
        }

        let mut updated = if options.use_callout {
            append_in_callout(&base, &options.callout_header, entry)
        } else {
            append_plain(&base, entry)
        };

        if let Some(spec) = &options.chart {
            updated = merge_chart_block(&updated, &table_points(&updated), spec);
        }

        if existed {
            self.store
                .modify(&DocumentHandle::existing(path), &updated)
                .await?;
        } else {
            if let Some(folder) = parent_folder(path) {
                self.ensure_folder(folder).await?;
            }
            self.store.create(path, &updated).await?;
        }

        tracing::debug!(path, created = !existed, "Entry appended");
        Ok(MergeOutcome::Appended)
    }

    async fn initial_content(&self, path: &str, options: &AppendOptions) -> String {
        let Some(template_path) = options.template_path.as_deref().filter(|p| !p.is_empty())
        else {
            return options.initial_content.clone();
        };

        match self.store.read_template(template_path).await {
            Ok(Some(template)) => render_entry(&template, &options.template_fields),
            Ok(None) => {
                tracing::warn!(path, template = template_path, "Template not found");
                options.initial_content.clone()
            }
            Err(e) => {
                tracing::warn!(path, template = template_path, error = %e, "Template unreadable");
                options.initial_content.clone()
            }
        }
    }
}
