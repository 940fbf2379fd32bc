//! Rendering finished indicator trees.

use crate::indicators::{IndicatorNode, IndicatorsTree};
use chrono::{DateTime, Utc};
use complyscan_core::{Action, Error, Result, Status};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::str::FromStr;
use uuid::Uuid;

/// Output shapes for a finished tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportFormat {
    /// Indented outline of every scope and finding.
    #[default]
    Nested,
    /// One line per finding, prefixed with its scope path.
    Compact,
    /// The raw tree as pretty-printed JSON.
    Json,
    /// Only the message of the last non-compliant finding.
    LastNonCompliant,
}

impl ReportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportFormat::Nested => "nested",
            ReportFormat::Compact => "compact",
            ReportFormat::Json => "json",
            ReportFormat::LastNonCompliant => "last-non-compliant",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nested" => Ok(ReportFormat::Nested),
            "compact" => Ok(ReportFormat::Compact),
            "json" => Ok(ReportFormat::Json),
            "last-non-compliant" => Ok(ReportFormat::LastNonCompliant),
            other => Err(Error::invalid_argument(format!(
                "unknown report format '{}' (expected nested, compact, json or last-non-compliant)",
                other
            ))),
        }
    }
}

/// Render `tree` in the requested format. An empty tree renders empty.
pub fn render(tree: &IndicatorsTree, format: ReportFormat) -> Result<String> {
    let Some(root) = tree.root() else {
        return Ok(String::new());
    };
    match format {
        ReportFormat::Nested => Ok(render_nested(root)),
        ReportFormat::Compact => Ok(render_compact(root)),
        ReportFormat::Json => serde_json::to_string_pretty(root)
            .map_err(|err| Error::failure(format!("failed to serialize indicators: {}", err))),
        ReportFormat::LastNonCompliant => Ok(render_last_non_compliant(root)),
    }
}

fn status_label(status: Option<Status>) -> &'static str {
    status.map(Status::as_str).unwrap_or("Unknown")
}

fn render_nested(root: &IndicatorNode) -> String {
    let mut out = String::new();
    nested_lines(root, 0, &mut out);
    out
}

fn nested_lines(node: &IndicatorNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let status = status_label(node.status);
    match &node.message {
        Some(message) => {
            let _ = writeln!(out, "{}[{}] {}", indent, status, message);
        }
        None => {
            let _ = writeln!(out, "{}[{}] {}", indent, status, node.label);
        }
    }
    for child in &node.children {
        nested_lines(child, depth + 1, out);
    }
}

fn render_compact(root: &IndicatorNode) -> String {
    let mut out = String::new();
    let mut path = Vec::new();
    compact_lines(root, &mut path, &mut out);
    out
}

fn compact_lines(node: &IndicatorNode, path: &mut Vec<String>, out: &mut String) {
    if let Some(message) = &node.message {
        let _ = writeln!(
            out,
            "{}: [{}] {}",
            path.join("/"),
            status_label(node.status),
            message
        );
        return;
    }
    path.push(node.label.clone());
    for child in &node.children {
        compact_lines(child, path, out);
    }
    path.pop();
}

fn render_last_non_compliant(root: &IndicatorNode) -> String {
    let mut last = None;
    collect_last_non_compliant(root, &mut last);
    match last {
        Some(message) => message,
        None => String::from("no non-compliant findings"),
    }
}

fn collect_last_non_compliant(node: &IndicatorNode, last: &mut Option<String>) {
    if node.message.is_some() && node.status == Some(Status::NonCompliant) {
        *last = node.message.clone();
    }
    for child in &node.children {
        collect_last_non_compliant(child, last);
    }
}

/// Assessment result envelope written by `--output`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Engine version that produced the report.
    pub version: String,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub status: Status,
    pub elapsed_ms: u64,
    pub indicators: IndicatorNode,
}

impl Report {
    /// Build the envelope around a finished evaluation.
    pub fn new(action: Action, status: Status, elapsed_ms: u64, indicators: IndicatorNode) -> Self {
        Self {
            version: complyscan_core::version().to_string(),
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            status,
            elapsed_ms,
            indicators,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| Error::failure(format!("failed to serialize report: {}", err)))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|err| Error::invalid_argument(format!("failed to parse report: {}", err)))
    }
}
