// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Mermaid chart blocks embedded in measurement files.
//!
//! The chart is derived entirely from the document's own table rows, so it
//! can be thrown away and re-rendered after every append.

const FENCE_OPEN: &str = "```mermaid";
const FENCE_CLOSE: &str = "```";
const CHART_KIND: &str = "xychart-beta";

/// Labels for a rendered chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSpec {
    pub title: String,
    pub y_label: String,
}

/// One plotted value.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
}

/// Render a single-series line chart as a fenced block (no trailing newline).
pub fn render_chart(spec: &ChartSpec, points: &[ChartPoint]) -> String {
    let labels = points
        .iter()
        .map(|p| format!("\"{}\"", quote_safe(&p.label)))
        .collect::<Vec<_>>()
        .join(", ");
    let values = points
        .iter()
        .map(|p| format!("{:.1}", p.value))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "{FENCE_OPEN}\n{CHART_KIND}\n    title \"{}\"\n    x-axis [{}]\n    y-axis \"{}\"\n    line [{}]\n{FENCE_CLOSE}",
        quote_safe(&spec.title),
        labels,
        quote_safe(&spec.y_label),
        values,
    )
}

fn quote_safe(text: &str) -> String {
    text.replace('"', "'")
}

/// Points from every table row whose first cell is a label and whose last
/// cell is numeric, ordered by label. Header and separator rows fall out
/// naturally.
pub fn table_points(document: &str) -> Vec<ChartPoint> {
    let mut points: Vec<ChartPoint> = document
        .lines()
        .filter_map(|line| {
            let cells = table_cells(line)?;
            let label = cells.first()?.to_string();
            let value = cells.last()?.parse::<f64>().ok()?;
            if label.is_empty() || cells.len() < 2 {
                return None;
            }
            Some(ChartPoint { label, value })
        })
        .collect();
    // Rows are appended in arrival order; backfilled samples land last.
    points.sort_by(|a, b| a.label.cmp(&b.label));
    points
}

fn table_cells(line: &str) -> Option<Vec<&str>> {
    let inner = line.trim().strip_prefix('|')?;
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    Some(inner.split('|').map(str::trim).collect())
}

pub(crate) fn is_table_line(line: &str) -> bool {
    line.trim_start().starts_with('|')
}

/// Line range (inclusive) of the first chart block, if any.
pub(crate) fn find_chart_block(lines: &[&str]) -> Option<(usize, usize)> {
    let start = lines.iter().enumerate().position(|(i, line)| {
        line.trim() == FENCE_OPEN
            && lines[i + 1..]
                .iter()
                .find(|l| !l.trim().is_empty())
                .is_some_and(|l| l.trim().starts_with(CHART_KIND))
    })?;
    let end = lines[start + 1..]
        .iter()
        .position(|line| line.trim() == FENCE_CLOSE)?
        + start
        + 1;
    Some((start, end))
}

/// Remove the chart block and the blank lines separating it from the
/// content above.
pub fn strip_chart_block(document: &str) -> String {
    let lines: Vec<&str> = document.lines().collect();
    let Some((start, end)) = find_chart_block(&lines) else {
        return document.to_string();
    };

    let mut keep_until = start;
    while keep_until > 0 && lines[keep_until - 1].trim().is_empty() {
        keep_until -= 1;
    }

    let mut kept: Vec<&str> = lines[..keep_until].to_vec();
    let rest = &lines[end + 1..];
    let rest_start = rest
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(rest.len());
    if rest_start < rest.len() {
        kept.push("");
        kept.extend_from_slice(&rest[rest_start..]);
    }

    join_lines(&kept)
}

pub(crate) fn join_lines(lines: &[&str]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
