// SPDX-License-Identifier: MPL-2.0
//! Health checks, issue detection, recovery and export across all components.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use super::error_reporter::ErrorReporter;
use super::export::{
    apply_redaction, generate_default_filename, write_atomic, ExportError, RedactionPolicy,
};
use super::logger::Logger;
use super::performance::PerformanceMonitor;
use super::report::{DiagnosticExport, DiagnosticSnapshot, Issue, RecoveryResult};
use crate::application::port::{
    DeviceInfo, KeyValueStore, NetworkStatus, NetworkStatusProvider, PlatformProvider,
};
use crate::config::Config;
use crate::domain::diagnostics::IssueSeverity;
use crate::error::StoreError;
use crate::infrastructure::PersisterHandle;

/// Scratch key written and read back by the storage check.
pub const STORAGE_SENTINEL_KEY: &str = "app_vitals.diagnostics.sentinel";
/// Prefix shared by every key this crate writes.
pub const KEY_PREFIX: &str = "app_vitals.";

/// Failure reported by an error-state reset callback.
#[derive(Debug, Clone, Error)]
#[error("error state reset failed: {0}")]
pub struct RecoveryError(pub String);

/// Host-supplied callback that returns some part of the UI or app state to a
/// clean state. Run by [`Diagnostics::perform_recovery_actions`].
pub type ErrorStateReset = Arc<dyn Fn() -> Result<(), RecoveryError> + Send + Sync>;

/// Thresholds used by issue detection and recovery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiagnosticsThresholds {
    pub recent_error_window: Duration,
    /// More than this many errors inside the window is an issue.
    pub recent_error_threshold: usize,
    pub memory_usage_percent: f32,
    /// Recovery clears the logs when they hold more than this many entries.
    pub recovery_log_threshold: usize,
    /// Recovery clears the reports when they hold more than this many entries.
    pub recovery_error_threshold: usize,
}

impl From<&Config> for DiagnosticsThresholds {
    fn from(config: &Config) -> Self {
        Self {
            recent_error_window: config.recent_error_window(),
            recent_error_threshold: config.recent_error_threshold,
            memory_usage_percent: config.memory_usage_threshold_percent,
            recovery_log_threshold: config.recovery_log_threshold,
            recovery_error_threshold: config.recovery_error_threshold,
        }
    }
}

impl Default for DiagnosticsThresholds {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Coordinates the logger, error reporter and performance monitor.
pub struct Diagnostics {
    logger: Arc<Logger>,
    reporter: Arc<ErrorReporter>,
    performance: Arc<PerformanceMonitor>,
    store: Arc<dyn KeyValueStore>,
    platform: Arc<dyn PlatformProvider>,
    network: Arc<dyn NetworkStatusProvider>,
    persister: PersisterHandle,
    app_version: String,
    thresholds: DiagnosticsThresholds,
    redaction: RedactionPolicy,
    resets: Mutex<Vec<ErrorStateReset>>,
}

/// Dependencies for [`Diagnostics::new`].
pub struct DiagnosticsParts {
    pub logger: Arc<Logger>,
    pub reporter: Arc<ErrorReporter>,
    pub performance: Arc<PerformanceMonitor>,
    pub store: Arc<dyn KeyValueStore>,
    pub platform: Arc<dyn PlatformProvider>,
    pub network: Arc<dyn NetworkStatusProvider>,
    pub persister: PersisterHandle,
    /// Reported when the platform provider cannot be queried.
    pub app_version: String,
}

impl Diagnostics {
    #[must_use]
    pub fn new(
        parts: DiagnosticsParts,
        thresholds: DiagnosticsThresholds,
        redaction: RedactionPolicy,
    ) -> Self {
        Self {
            logger: parts.logger,
            reporter: parts.reporter,
            performance: parts.performance,
            store: parts.store,
            platform: parts.platform,
            network: parts.network,
            persister: parts.persister,
            app_version: parts.app_version,
            thresholds,
            redaction,
            resets: Mutex::new(Vec::new()),
        }
    }

    /// Adds a callback run first by every recovery pass.
    pub fn register_error_state_reset(
        &self,
        reset: impl Fn() -> Result<(), RecoveryError> + Send + Sync + 'static,
    ) {
        self.resets.lock().push(Arc::new(reset));
    }

    /// Collects a snapshot of health and buffered data.
    ///
    /// The storage, connectivity and memory checks degrade to an unhealthy
    /// or unknown reading when they fail or panic. A failing platform
    /// provider yields an unknown device; a panicking one is not caught
    /// here and surfaces through [`check_common_issues`](Self::check_common_issues).
    pub async fn run_diagnostics(&self) -> DiagnosticSnapshot {
        let storage_health = self.check_storage().await;

        let network = match AssertUnwindSafe(self.network.status()).catch_unwind().await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "connectivity check failed");
                NetworkStatus::UNKNOWN
            }
            Err(_) => {
                tracing::warn!("connectivity check panicked");
                NetworkStatus::UNKNOWN
            }
        };
        self.reporter.note_network_type(network.network_type);

        let platform = Arc::clone(&self.platform);
        let memory_usage = std::panic::catch_unwind(AssertUnwindSafe(|| {
            platform.memory_usage_percent()
        }))
        .unwrap_or_else(|_| {
            tracing::warn!("memory check panicked");
            None
        });

        let device = self.platform.device_info().unwrap_or_else(|err| {
            tracing::debug!(error = %err, "device info unavailable");
            DeviceInfo::unknown(self.app_version.as_str())
        });

        DiagnosticSnapshot {
            platform: device.platform,
            version: device.app_version,
            storage_health,
            network_connectivity: network.connected,
            network_type: network.network_type,
            memory_usage,
            errors: self.reporter.get_reports(),
            logs: self.logger.get_logs(),
            metrics: self.performance.get_metrics(),
            active_traces: self.performance.active_trace_count(),
            timestamp: Utc::now(),
        }
    }

    /// Writes, reads back and removes a sentinel value.
    pub async fn check_storage(&self) -> bool {
        let expected = format!("ok:{}", Uuid::new_v4());
        let round_trip = async {
            self.store.set(STORAGE_SENTINEL_KEY, &expected).await?;
            let read_back = self.store.get(STORAGE_SENTINEL_KEY).await?;
            if let Err(err) = self.store.remove(STORAGE_SENTINEL_KEY).await {
                tracing::debug!(error = %err, "failed to remove storage sentinel");
            }
            Ok::<bool, StoreError>(read_back.as_deref() == Some(expected.as_str()))
        };

        match AssertUnwindSafe(round_trip).catch_unwind().await {
            Ok(Ok(true)) => true,
            Ok(Ok(false)) => {
                tracing::warn!("storage check read back a different value");
                false
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "storage check failed");
                false
            }
            Err(_) => {
                tracing::warn!("storage check panicked");
                false
            }
        }
    }

    /// Runs diagnostics and turns the findings into issues.
    pub async fn check_common_issues(&self) -> Vec<Issue> {
        match AssertUnwindSafe(self.run_diagnostics()).catch_unwind().await {
            Ok(snapshot) => detect_issues(&snapshot, &self.thresholds, Utc::now()),
            Err(_) => {
                tracing::error!("diagnostic run panicked");
                vec![Issue::new(
                    IssueSeverity::High,
                    "Failed to run diagnostic check",
                    "Restart the app and try again",
                )]
            }
        }
    }

    /// Resets error state, trims oversized buffers and re-checks storage.
    ///
    /// Every step runs even if an earlier one failed.
    pub async fn perform_recovery_actions(&self) -> RecoveryResult {
        let mut result = RecoveryResult {
            success: true,
            actions_performed: Vec::new(),
        };

        let resets: Vec<ErrorStateReset> = self.resets.lock().clone();
        if !resets.is_empty() {
            let mut failed = 0usize;
            for reset in &resets {
                match std::panic::catch_unwind(AssertUnwindSafe(|| reset())) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::warn!(error = %err, "error state reset failed");
                        failed += 1;
                    }
                    Err(_) => {
                        tracing::warn!("error state reset panicked");
                        failed += 1;
                    }
                }
            }
            if failed == 0 {
                result.actions_performed.push("Reset error state".to_string());
            } else {
                result.success = false;
            }
        }

        if self.logger.len() > self.thresholds.recovery_log_threshold {
            self.logger.clear_logs();
            result.actions_performed.push("Cleared old logs".to_string());
        }

        if self.reporter.len() > self.thresholds.recovery_error_threshold {
            self.reporter.clear_reports();
            result.actions_performed.push("Cleared old error reports".to_string());
        }

        if self.check_storage().await {
            result.actions_performed.push("Verified storage".to_string());
        } else {
            result.success = false;
        }

        tracing::info!(
            success = result.success,
            actions = result.actions_performed.len(),
            "recovery finished"
        );
        result
    }

    /// Runs diagnostics and wraps the result in an export bundle, redacted per
    /// the configured policy.
    pub async fn export_bundle(&self) -> DiagnosticExport {
        let snapshot = apply_redaction(self.run_diagnostics().await, self.redaction);
        DiagnosticExport::new(snapshot, self.redaction)
    }

    /// Export bundle as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub async fn export_diagnostic_data(&self) -> Result<String, ExportError> {
        Ok(self.export_bundle().await.to_json()?)
    }

    /// Writes the export bundle to `path`, or to a timestamped file in
    /// `directory` when `path` is a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn export_to_file(&self, path: &Path) -> Result<PathBuf, ExportError> {
        let target = if tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
        {
            path.join(generate_default_filename())
        } else {
            path.to_path_buf()
        };

        let json = self.export_diagnostic_data().await?;
        write_atomic(&target, &json).await?;
        tracing::info!(path = %target.display(), "diagnostics exported");
        Ok(target)
    }

    /// Empties every buffer and deletes every key this crate has written.
    ///
    /// Settings stay in effect for the running process but revert to their
    /// defaults on the next start.
    ///
    /// # Errors
    ///
    /// Returns the first store error; keys after it are left in place.
    pub async fn clear_all_data(&self) -> Result<usize, StoreError> {
        self.logger.clear_logs();
        self.reporter.clear_reports();
        self.performance.clear_metrics();
        self.persister.sync().await;

        let mut removed = 0usize;
        for key in self.store.list_keys().await? {
            if key.starts_with(KEY_PREFIX) {
                self.store.remove(&key).await?;
                removed += 1;
            }
        }
        tracing::info!(removed, "cleared all diagnostics data");
        Ok(removed)
    }
}

/// Applies the issue rules to `snapshot`.
#[must_use]
pub fn detect_issues(
    snapshot: &DiagnosticSnapshot,
    thresholds: &DiagnosticsThresholds,
    now: DateTime<Utc>,
) -> Vec<Issue> {
    let mut issues = Vec::new();

    if !snapshot.storage_health {
        issues.push(Issue::new(
            IssueSeverity::High,
            "Storage is not working properly",
            "Free up device storage or clear the app data, then restart the app",
        ));
    }

    if !snapshot.network_connectivity {
        issues.push(Issue::new(
            IssueSeverity::Medium,
            "No internet connection",
            "Check your Wi-Fi or mobile data connection",
        ));
    }

    let window = chrono::TimeDelta::from_std(thresholds.recent_error_window)
        .unwrap_or(chrono::TimeDelta::MAX);
    let recent_errors = snapshot
        .errors
        .iter()
        .filter(|report| now.signed_duration_since(report.metadata.timestamp) <= window)
        .count();
    if recent_errors > thresholds.recent_error_threshold {
        issues.push(Issue::new(
            IssueSeverity::High,
            format!("{recent_errors} errors occurred recently"),
            "Restart the app; if the problem persists, export diagnostics and contact support",
        ));
    }

    if let Some(memory) = snapshot.memory_usage {
        if memory > thresholds.memory_usage_percent {
            issues.push(Issue::new(
                IssueSeverity::Medium,
                format!("High memory usage ({memory:.0}%)"),
                "Close unused apps or restart the app to free memory",
            ));
        }
    }

    issues
}
