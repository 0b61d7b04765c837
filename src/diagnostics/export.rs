// SPDX-License-Identifier: MPL-2.0
//! Export of diagnostic bundles.
//!
//! Bundles are scrubbed according to [`RedactionPolicy`] before they are
//! serialized, and written to disk atomically.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error_reporter::ErrorReport;
use super::logger::LogEntry;
use super::performance::PerformanceMetric;
use super::privacy::{sanitize_message, IdentityAnonymizer};
use super::report::DiagnosticSnapshot;
use crate::domain::diagnostics::{TagValue, Tags};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How personal data is treated in exports.
///
/// With [`Redact`](Self::Redact), user ids and device models are replaced
/// with salted hashes, and free text (log messages, error messages, stacks,
/// text tags) has paths, e-mail addresses, IP addresses, host names and the
/// local user name removed. Platform, OS version and network type are coarse
/// enough to keep as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionPolicy {
    #[default]
    Redact,
    /// Export everything verbatim.
    None,
}

/// Applies `policy` to a snapshot.
#[must_use]
pub fn apply_redaction(snapshot: DiagnosticSnapshot, policy: RedactionPolicy) -> DiagnosticSnapshot {
    match policy {
        RedactionPolicy::None => snapshot,
        RedactionPolicy::Redact => redact_snapshot(snapshot, &IdentityAnonymizer::new()),
    }
}

/// Scrubs every buffered entry in `snapshot` with `anonymizer`.
#[must_use]
pub fn redact_snapshot(
    mut snapshot: DiagnosticSnapshot,
    anonymizer: &IdentityAnonymizer,
) -> DiagnosticSnapshot {
    snapshot.logs = snapshot
        .logs
        .into_iter()
        .map(|entry| LogEntry {
            message: scrub(&entry.message, anonymizer),
            tags: scrub_tags(entry.tags, anonymizer),
            ..entry
        })
        .collect();

    snapshot.errors = snapshot
        .errors
        .into_iter()
        .map(|report| redact_report(report, anonymizer))
        .collect();

    snapshot.metrics = snapshot
        .metrics
        .into_iter()
        .map(|metric| PerformanceMetric {
            attributes: scrub_tags(metric.attributes, anonymizer),
            ..metric
        })
        .collect();

    snapshot
}

fn redact_report(mut report: ErrorReport, anonymizer: &IdentityAnonymizer) -> ErrorReport {
    report.message = scrub(&report.message, anonymizer);
    report.stack = report.stack.map(|stack| scrub(&stack, anonymizer));

    let metadata = &mut report.metadata;
    metadata.user_id = metadata
        .user_id
        .take()
        .map(|id| anonymizer.hash_token("user", &id));
    metadata.device_model = anonymizer.hash_token("device", &metadata.device_model);
    metadata.extra = scrub_tags(std::mem::take(&mut metadata.extra), anonymizer);
    report
}

fn scrub(text: &str, anonymizer: &IdentityAnonymizer) -> String {
    anonymizer.anonymize_string(&sanitize_message(text))
}

fn scrub_tags(tags: Tags, anonymizer: &IdentityAnonymizer) -> Tags {
    tags.into_iter()
        .map(|(key, value)| {
            let value = match value {
                TagValue::Text(text) => TagValue::Text(scrub(&text, anonymizer)),
                other => other,
            };
            (key, value)
        })
        .collect()
}

/// Default file name for an export: `app_vitals_diagnostics_YYYYMMDD_HHMMSS.json`.
///
/// Uses local time.
#[must_use]
pub fn generate_default_filename() -> String {
    let now = Local::now();
    format!("app_vitals_diagnostics_{}.json", now.format("%Y%m%d_%H%M%S"))
}

/// Writes `content` to a sibling temp file, then renames it over `path`.
///
/// Readers never observe a partially written file. Missing parent
/// directories are created.
///
/// # Errors
///
/// Returns an error if the directory, the temp file or the rename fails.
pub async fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let temp_path = temp_path_for(path);
    tokio::fs::write(&temp_path, content).await?;
    if let Err(err) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(err);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
