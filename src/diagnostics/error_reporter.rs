// SPDX-License-Identifier: MPL-2.0
//! Captured application errors with session and device context.
//!
//! Reports are enriched with the session id, the user id set by the host,
//! device information and the last known network type, then kept in a
//! persistent ring buffer. Capturing is synchronous so it can run inside the
//! panic hook; the network type is therefore cached and refreshed
//! asynchronously by [`ErrorReporter::refresh_network_type`].

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt::Write as _;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::buffer::{BufferCapacity, PersistentRingBuffer};
use super::panic_hook::{self, PanicHookRegistration, PanicReport};
use crate::application::port::{
    device_info_or_unknown, DeviceInfo, FlushBatch, KeyValueStore, NetworkStatusProvider,
    NetworkType, PlatformProvider, RemoteSink,
};
use crate::domain::diagnostics::{Severity, TagValue, Tags};
use crate::infrastructure::PersisterHandle;

/// Store key holding the serialized report buffer.
pub const ERROR_REPORTS_KEY: &str = "app_vitals.errors.reports";
/// Store key holding `{ enabled }`.
pub const ERROR_SETTINGS_KEY: &str = "app_vitals.errors.settings";

/// Context names owned by the reporter; caller metadata cannot override them.
const RESERVED_METADATA_KEYS: &[&str] = &[
    "session_id",
    "user_id",
    "timestamp",
    "platform",
    "app_version",
    "device_model",
    "os_version",
    "network_type",
];

/// One captured error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub severity: Severity,
    pub metadata: ErrorMetadata,
}

/// Process-wide context merged with caller-supplied metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetadata {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub platform: String,
    pub app_version: String,
    pub device_model: String,
    pub os_version: String,
    pub network_type: NetworkType,
    #[serde(flatten)]
    pub extra: Tags,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ReporterSettings {
    enabled: bool,
}

/// Captures errors into a bounded, persisted report buffer.
pub struct ErrorReporter {
    reports: PersistentRingBuffer<ErrorReport>,
    enabled: RwLock<bool>,
    session_id: String,
    user_id: RwLock<Option<String>>,
    network_type: RwLock<NetworkType>,
    /// Last device info obtained from the provider; used inside the panic hook.
    device: RwLock<DeviceInfo>,
    app_version: String,
    platform: Arc<dyn PlatformProvider>,
    network: Arc<dyn NetworkStatusProvider>,
    persister: PersisterHandle,
    sink: Arc<dyn RemoteSink>,
}

impl ErrorReporter {
    /// Restores settings and reports from `store` and starts a new session.
    ///
    /// `app_version` is reported when the platform provider cannot be queried.
    pub async fn load(
        capacity: BufferCapacity,
        store: &dyn KeyValueStore,
        persister: PersisterHandle,
        platform: Arc<dyn PlatformProvider>,
        app_version: impl Into<String>,
        network: Arc<dyn NetworkStatusProvider>,
        sink: Arc<dyn RemoteSink>,
    ) -> Self {
        let enabled = match store.get(ERROR_SETTINGS_KEY).await {
            Ok(Some(json)) => match serde_json::from_str::<ReporterSettings>(&json) {
                Ok(settings) => settings.enabled,
                Err(err) => {
                    tracing::warn!(error = %err, "ignoring unreadable error reporter settings");
                    true
                }
            },
            Ok(None) => true,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load error reporter settings");
                true
            }
        };
        let reports =
            PersistentRingBuffer::load(ERROR_REPORTS_KEY, capacity, store, persister.clone())
                .await;

        let app_version = app_version.into();
        let device = device_info_or_unknown(platform.as_ref(), &app_version);
        let reporter = Self {
            reports,
            enabled: RwLock::new(enabled),
            session_id: Uuid::new_v4().to_string(),
            user_id: RwLock::new(None),
            network_type: RwLock::new(NetworkType::Unknown),
            device: RwLock::new(device),
            app_version,
            platform,
            network,
            persister,
            sink,
        };
        reporter.refresh_network_type().await;
        reporter
    }

    /// Records `error` with its `source()` chain as the stack.
    pub fn capture_error(
        &self,
        error: &(dyn StdError + 'static),
        severity: Severity,
        metadata: Tags,
    ) {
        self.record(
            error.to_string(),
            source_chain(error),
            severity,
            metadata,
            self.query_device(),
        );
    }

    /// Records a plain message.
    pub fn capture_message(&self, message: impl Into<String>, severity: Severity, metadata: Tags) {
        self.record(message.into(), None, severity, metadata, self.query_device());
    }

    fn record(
        &self,
        message: String,
        stack: Option<String>,
        severity: Severity,
        metadata: Tags,
        device: DeviceInfo,
    ) {
        if !self.is_enabled() {
            return;
        }

        let report = ErrorReport {
            message,
            stack,
            severity,
            metadata: self.context(metadata, device),
        };
        tracing::error!(
            target: "app_vitals::errors",
            severity = %report.severity,
            session_id = %report.metadata.session_id,
            "{}",
            report.message
        );
        self.reports.push(report);
    }

    /// Asks the provider and remembers the answer for panic-time reports.
    fn query_device(&self) -> DeviceInfo {
        let device = device_info_or_unknown(self.platform.as_ref(), &self.app_version);
        *self.device.write() = device.clone();
        device
    }

    fn context(&self, mut extra: Tags, device: DeviceInfo) -> ErrorMetadata {
        extra.retain(|key, _| {
            let reserved = RESERVED_METADATA_KEYS.contains(&key.as_str());
            if reserved {
                tracing::debug!(key = %key, "dropping caller metadata that shadows report context");
            }
            !reserved
        });

        ErrorMetadata {
            session_id: self.session_id.clone(),
            user_id: self.user_id.read().clone(),
            timestamp: Utc::now(),
            platform: device.platform,
            app_version: device.app_version,
            device_model: device.device_model,
            os_version: device.os_version,
            network_type: *self.network_type.read(),
            extra,
        }
    }

    /// Sets or clears the user id attached to subsequent reports.
    pub fn set_user_id(&self, user_id: Option<String>) {
        *self.user_id.write() = user_id;
    }

    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }

    /// Random id generated when the reporter was created.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Persists the flag while holding the lock, so the stored value always
    /// matches the last toggle.
    pub fn set_enabled(&self, enabled: bool) {
        let mut current = self.enabled.write();
        *current = enabled;
        match serde_json::to_string(&ReporterSettings { enabled }) {
            Ok(json) => self.persister.save(ERROR_SETTINGS_KEY, json),
            Err(err) => tracing::warn!(error = %err, "failed to serialize error reporter settings"),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self.enabled.read()
    }

    /// Copy of the buffered reports, oldest first.
    #[must_use]
    pub fn get_reports(&self) -> Vec<ErrorReport> {
        self.reports.snapshot()
    }

    /// Empties the buffer and its durable copy. Idempotent.
    pub fn clear_reports(&self) {
        self.reports.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Network type attached to new reports.
    #[must_use]
    pub fn network_type(&self) -> NetworkType {
        *self.network_type.read()
    }

    /// Replaces the cached network type with a fresh reading.
    pub fn note_network_type(&self, network_type: NetworkType) {
        *self.network_type.write() = network_type;
    }

    /// Queries the network provider and updates the cached network type.
    pub async fn refresh_network_type(&self) {
        let network_type = match AssertUnwindSafe(self.network.status()).catch_unwind().await {
            Ok(Ok(status)) => status.network_type,
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "network status unavailable");
                NetworkType::Unknown
            }
            Err(_) => {
                tracing::warn!("network status provider panicked");
                NetworkType::Unknown
            }
        };
        self.note_network_type(network_type);
    }

    /// Ships buffered reports to the remote sink.
    ///
    /// Does nothing while disabled or empty. Failed batches are kept.
    pub async fn flush(&self) {
        if !self.is_enabled() || self.reports.is_empty() {
            return;
        }

        let batch = self.reports.drain();
        let count = batch.len();
        match self.sink.ship(FlushBatch::ErrorReports(batch.clone())).await {
            Ok(()) => tracing::debug!(count, "flushed error reports"),
            Err(err) => {
                tracing::warn!(count, error = %err, "error report flush failed, keeping reports");
                self.reports.restore_front(batch);
            }
        }
    }

    /// Captures every panic in the process as a [`Severity::Fatal`] report.
    ///
    /// Previously installed panic hooks keep running after the capture. The
    /// hook holds only a weak reference, so it stops capturing once the
    /// reporter is dropped; dropping the registration removes it entirely.
    pub fn install_panic_hook(self: &Arc<Self>) -> PanicHookRegistration {
        let reporter: Weak<Self> = Arc::downgrade(self);
        panic_hook::register(move |report| {
            if let Some(reporter) = reporter.upgrade() {
                reporter.capture_panic(report);
            }
        })
    }

    fn capture_panic(&self, report: &PanicReport) {
        let mut metadata = BTreeMap::new();
        if let Some(location) = &report.location {
            metadata.insert("location".to_string(), TagValue::from(location.as_str()));
        }
        if let Some(thread) = &report.thread {
            metadata.insert("thread".to_string(), TagValue::from(thread.as_str()));
        }
        let stack = report
            .backtrace
            .clone()
            .or_else(|| report.location.as_ref().map(|loc| format!("at {loc}")));

        // The provider is not called here: a panic inside the hook aborts.
        let device = self.device.read().clone();
        self.record(report.message.clone(), stack, Severity::Fatal, metadata, device);
    }
}

/// Renders the `source()` chain, or `None` when the error has no cause.
fn source_chain(error: &(dyn StdError + 'static)) -> Option<String> {
    let mut source = error.source()?;
    let mut chain = String::from("Caused by:");
    let mut index = 0usize;
    loop {
        let _ = write!(chain, "\n  {index}: {source}");
        index += 1;
        match source.source() {
            Some(next) => source = next,
            None => break,
        }
    }
    Some(chain)
}
