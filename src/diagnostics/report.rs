// SPDX-License-Identifier: MPL-2.0
//! Data produced by the diagnostics coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error_reporter::ErrorReport;
use super::export::RedactionPolicy;
use super::logger::LogEntry;
use super::performance::PerformanceMetric;
use crate::application::port::NetworkType;
use crate::domain::diagnostics::IssueSeverity;

/// Point-in-time health and buffer contents.
///
/// The buffers are copies taken when the snapshot was built; later activity
/// does not change them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticSnapshot {
    pub platform: String,
    pub version: String,
    pub storage_health: bool,
    pub network_connectivity: bool,
    pub network_type: NetworkType,
    /// Percent of memory in use; `None` when the host has no such sample.
    pub memory_usage: Option<f32>,
    pub errors: Vec<ErrorReport>,
    pub logs: Vec<LogEntry>,
    pub metrics: Vec<PerformanceMetric>,
    pub active_traces: usize,
    pub timestamp: DateTime<Utc>,
}

/// A detected problem with a suggested remedy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub description: String,
    pub solution: String,
    pub severity: IssueSeverity,
}

impl Issue {
    #[must_use]
    pub fn new(
        severity: IssueSeverity,
        description: impl Into<String>,
        solution: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            solution: solution.into(),
            severity,
        }
    }
}

/// Outcome of [`Diagnostics::perform_recovery_actions`](super::Diagnostics::perform_recovery_actions).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecoveryResult {
    /// False if any step failed.
    pub success: bool,
    /// Human-readable description of every step that completed.
    pub actions_performed: Vec<String>,
}

/// Self-describing export bundle. `app_version` is the host application's
/// version as reported in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticExport {
    pub export_id: String,
    pub exported_at: DateTime<Utc>,
    pub app_version: String,
    pub redaction: RedactionPolicy,
    pub snapshot: DiagnosticSnapshot,
}

impl DiagnosticExport {
    #[must_use]
    pub fn new(snapshot: DiagnosticSnapshot, redaction: RedactionPolicy) -> Self {
        Self {
            export_id: Uuid::new_v4().to_string(),
            exported_at: Utc::now(),
            app_version: snapshot.version.clone(),
            redaction,
            snapshot,
        }
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
