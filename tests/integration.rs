// SPDX-License-Identifier: MPL-2.0
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use app_vitals::application::port::{
    DeviceInfo, KeyValueStore, NetworkStatus, NetworkStatusProvider, NetworkType, PlatformProvider,
};
use app_vitals::config::{self, Config};
use app_vitals::diagnostics::{
    DiagnosticExport, RecoveryError, RedactionPolicy, ERROR_REPORTS_KEY, LOG_ENTRIES_KEY,
    PERFORMANCE_METRICS_KEY,
};
use app_vitals::domain::diagnostics::{
    BufferCapacity, IssueSeverity, LogLevel, Severity, TagValue, Tags,
};
use app_vitals::error::{ProviderError, StoreError};
use app_vitals::infrastructure::{FileStore, MemoryStore};
use app_vitals::Vitals;
use async_trait::async_trait;
use tempfile::tempdir;

// =============================================================================
// Test doubles
// =============================================================================

struct FixedPlatform {
    memory: Option<f32>,
}

impl PlatformProvider for FixedPlatform {
    fn device_info(&self) -> Result<DeviceInfo, ProviderError> {
        Ok(DeviceInfo {
            platform: "linux".into(),
            os_version: "6.1".into(),
            app_version: "1.2.3".into(),
            device_model: "bench-rig".into(),
        })
    }

    fn memory_usage_percent(&self) -> Option<f32> {
        self.memory
    }
}

struct FailingPlatform;

impl PlatformProvider for FailingPlatform {
    fn device_info(&self) -> Result<DeviceInfo, ProviderError> {
        Err(ProviderError::Unavailable("no device".into()))
    }
}

struct PanickingPlatform;

impl PlatformProvider for PanickingPlatform {
    fn device_info(&self) -> Result<DeviceInfo, ProviderError> {
        panic!("device query exploded");
    }
}

struct StaticNetwork {
    connected: bool,
}

#[async_trait]
impl NetworkStatusProvider for StaticNetwork {
    async fn status(&self) -> Result<NetworkStatus, ProviderError> {
        Ok(NetworkStatus {
            connected: self.connected,
            network_type: if self.connected {
                NetworkType::Ethernet
            } else {
                NetworkType::None
            },
        })
    }
}

struct PanickingNetwork;

#[async_trait]
impl NetworkStatusProvider for PanickingNetwork {
    async fn status(&self) -> Result<NetworkStatus, ProviderError> {
        panic!("network probe exploded");
    }
}

/// A store whose every operation fails.
struct BrokenStore;

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("disk gone".into()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk gone".into()))
    }

    async fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk gone".into()))
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("disk gone".into()))
    }
}

async fn open_with(store: Arc<dyn KeyValueStore>, config: Config) -> Vitals {
    Vitals::builder(store)
        .config(config)
        .platform(Arc::new(FixedPlatform { memory: Some(25.0) }))
        .network(Arc::new(StaticNetwork { connected: true }))
        .open()
        .await
}

async fn open_memory() -> (Vitals, MemoryStore) {
    let store = MemoryStore::new();
    let vitals = open_with(Arc::new(store.clone()), Config::default()).await;
    (vitals, store)
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_config_round_trip_via_path() {
    let dir = tempdir().expect("Failed to create temporary directory");
    let path = dir.path().join("settings.toml");

    let config = Config {
        logger_capacity: BufferCapacity::new(500),
        default_log_level: LogLevel::Warn,
        stale_trace_max_age_secs: Some(600),
        export_redaction: RedactionPolicy::None,
        ..Config::default()
    };
    config::save_to_path(&config, &path).expect("Failed to write config file");

    let loaded = config::load_from_path(&path).expect("Failed to load config from path");
    assert_eq!(loaded, config);
}

// =============================================================================
// Components
// =============================================================================

#[tokio::test]
async fn min_level_filters_lower_entries() {
    let (vitals, _store) = open_memory().await;

    vitals.logger().set_min_level(LogLevel::Warn);
    vitals.logger().info("x", Tags::new());
    vitals.logger().warn("y", Tags::new());
    vitals.logger().error("z", Tags::new());

    let logs: Vec<_> = vitals
        .logger()
        .get_logs()
        .into_iter()
        .map(|entry| (entry.level, entry.message))
        .collect();
    assert_eq!(
        logs,
        vec![(LogLevel::Warn, "y".to_string()), (LogLevel::Error, "z".to_string())]
    );
}

#[tokio::test]
async fn trace_of_fifty_millis_is_measured() {
    let (vitals, _store) = open_memory().await;

    let handle = vitals.performance().start_trace("load", Tags::new());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let duration = vitals
        .performance()
        .stop_trace(&handle, Tags::new())
        .expect("trace was open");

    assert!((30.0..300.0).contains(&duration), "duration {duration}");
    assert_eq!(vitals.performance().get_metrics().len(), 1);
}

#[tokio::test]
async fn measure_passes_errors_through() {
    let (vitals, _store) = open_memory().await;

    let result: Result<u32, std::io::Error> = vitals
        .performance()
        .measure("read", Tags::new(), async {
            Err(std::io::Error::other("read failed"))
        })
        .await;

    assert_eq!(result.expect_err("error expected").to_string(), "read failed");
    assert_eq!(vitals.performance().get_metrics().len(), 1);
    assert_eq!(vitals.performance().active_trace_count(), 0);
}

#[tokio::test]
async fn error_buffer_keeps_newest_twenty() {
    let config = Config {
        error_capacity: BufferCapacity::new(20),
        ..Config::default()
    };
    let vitals = open_with(Arc::new(MemoryStore::new()), config).await;

    for index in 1..=21 {
        vitals
            .errors()
            .capture_message(format!("error {index}"), Severity::Error, Tags::new());
    }

    let reports = vitals.errors().get_reports();
    assert_eq!(reports.len(), 20);
    assert_eq!(reports[0].message, "error 2");
    assert_eq!(reports[19].message, "error 21");
}

#[tokio::test]
async fn clearing_is_idempotent_in_memory_and_in_the_store() {
    let (vitals, store) = open_memory().await;

    vitals.logger().info("one", Tags::new());
    vitals
        .errors()
        .capture_message("two", Severity::Info, Tags::new());
    vitals.performance().record_metric("three", 3.0, Tags::new());
    vitals.sync().await;

    for _ in 0..2 {
        vitals.logger().clear_logs();
        vitals.errors().clear_reports();
        vitals.performance().clear_metrics();
    }
    vitals.sync().await;

    assert!(vitals.logger().is_empty());
    assert!(vitals.errors().is_empty());
    assert!(vitals.performance().is_empty());
    let durable = store.snapshot();
    for key in [LOG_ENTRIES_KEY, ERROR_REPORTS_KEY, PERFORMANCE_METRICS_KEY] {
        assert!(!durable.contains_key(key), "{key} still stored");
    }
}

#[tokio::test]
async fn state_survives_reopen_on_disk() {
    let dir = tempdir().expect("temp dir");

    {
        let vitals = open_with(Arc::new(FileStore::new(dir.path())), Config::default()).await;
        vitals.logger().set_min_level(LogLevel::Error);
        vitals.logger().error("persisted", Tags::new());
        vitals.performance().set_enabled(false);
        vitals.shutdown().await;
    }

    let vitals = open_with(Arc::new(FileStore::new(dir.path())), Config::default()).await;
    assert_eq!(vitals.logger().min_level(), LogLevel::Error);
    assert!(!vitals.performance().is_enabled());
    let logs = vitals.logger().get_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "persisted");
    vitals.shutdown().await;
}

#[tokio::test]
async fn non_finite_tags_do_not_lose_history_on_reopen() {
    let store = MemoryStore::new();
    {
        let vitals = open_with(Arc::new(store.clone()), Config::default()).await;
        vitals.logger().info("first", Tags::new());
        vitals.logger().info(
            "ratio",
            Tags::from([("r".to_string(), TagValue::Float(f64::NAN))]),
        );
        vitals.logger().info(
            "bound",
            Tags::from([("limit".to_string(), TagValue::from(f64::INFINITY))]),
        );
        vitals.shutdown().await;
    }

    let vitals = open_with(Arc::new(store), Config::default()).await;
    let logs = vitals.logger().get_logs();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[1].tags.get("r"), Some(&TagValue::from("NaN")));
    assert_eq!(logs[2].tags.get("limit"), Some(&TagValue::from("inf")));
    vitals.shutdown().await;
}

#[tokio::test]
async fn fallback_device_reports_the_configured_app_version() {
    let vitals = Vitals::builder(Arc::new(MemoryStore::new()))
        .app_version("4.5.6")
        .platform(Arc::new(FailingPlatform))
        .network(Arc::new(StaticNetwork { connected: true }))
        .open()
        .await;

    vitals
        .errors()
        .capture_message("boom", Severity::Error, Tags::new());
    assert_eq!(vitals.errors().get_reports()[0].metadata.app_version, "4.5.6");

    let json = vitals
        .diagnostics()
        .export_diagnostic_data()
        .await
        .expect("export");
    let bundle: DiagnosticExport = serde_json::from_str(&json).expect("valid bundle");
    assert_eq!(bundle.app_version, "4.5.6");
}

#[tokio::test]
async fn concurrent_logging_stays_bounded_and_durable() {
    let (vitals, store) = open_memory().await;
    let vitals = Arc::new(vitals);

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let vitals = Arc::clone(&vitals);
            tokio::task::spawn_blocking(move || {
                for line in 0..100 {
                    vitals
                        .logger()
                        .info(format!("worker {worker} line {line}"), Tags::new());
                }
            })
        })
        .collect();
    for worker in workers {
        worker.await.expect("worker finished");
    }
    vitals.sync().await;

    let logs = vitals.logger().get_logs();
    assert_eq!(logs.len(), 200);
    let durable = store
        .snapshot()
        .get(LOG_ENTRIES_KEY)
        .cloned()
        .expect("logs stored");
    assert_eq!(durable, serde_json::to_string(&logs).expect("serialize"));
}

#[tokio::test]
async fn panics_are_captured_as_fatal() {
    let store = MemoryStore::new();
    let vitals = Vitals::builder(Arc::new(store))
        .platform(Arc::new(FixedPlatform { memory: None }))
        .network(Arc::new(StaticNetwork { connected: true }))
        .capture_panics(true)
        .open()
        .await;

    let _ = std::thread::spawn(|| panic!("integration panic")).join();
    vitals.shutdown().await;

    let fatal: Vec<_> = vitals
        .errors()
        .get_reports()
        .into_iter()
        .filter(|report| report.message == "integration panic")
        .collect();
    assert_eq!(fatal.len(), 1);
    assert_eq!(fatal[0].severity, Severity::Fatal);
}

// =============================================================================
// Diagnostics coordinator
// =============================================================================

#[tokio::test]
async fn healthy_system_reports_no_issues() {
    let (vitals, store) = open_memory().await;

    let snapshot = vitals.diagnostics().run_diagnostics().await;
    assert!(snapshot.storage_health);
    assert!(snapshot.network_connectivity);
    assert_eq!(snapshot.memory_usage, Some(25.0));
    assert_eq!(snapshot.version, "1.2.3");

    assert!(vitals.diagnostics().check_common_issues().await.is_empty());
    // Sentinel is cleaned up.
    vitals.sync().await;
    assert!(store.snapshot().keys().all(|key| !key.contains("sentinel")));
}

#[tokio::test]
async fn six_recent_errors_raise_an_issue_five_do_not() {
    let (vitals, _store) = open_memory().await;

    for _ in 0..5 {
        vitals
            .errors()
            .capture_message("flaky", Severity::Error, Tags::new());
    }
    assert!(vitals.diagnostics().check_common_issues().await.is_empty());

    vitals
        .errors()
        .capture_message("flaky", Severity::Error, Tags::new());
    let issues = vitals.diagnostics().check_common_issues().await;
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, IssueSeverity::High);
}

#[tokio::test]
async fn broken_storage_is_a_high_issue() {
    let vitals = open_with(Arc::new(BrokenStore), Config::default()).await;

    let snapshot = vitals.diagnostics().run_diagnostics().await;
    assert!(!snapshot.storage_health);

    let issues = vitals.diagnostics().check_common_issues().await;
    assert!(issues
        .iter()
        .any(|issue| issue.severity == IssueSeverity::High
            && issue.description.contains("Storage")));

    let result = vitals.diagnostics().perform_recovery_actions().await;
    assert!(!result.success);
    assert!(vitals.diagnostics().clear_all_data().await.is_err());
}

#[tokio::test]
async fn offline_and_memory_pressure_are_medium_issues() {
    let vitals = Vitals::builder(Arc::new(MemoryStore::new()))
        .platform(Arc::new(FixedPlatform { memory: Some(93.0) }))
        .network(Arc::new(StaticNetwork { connected: false }))
        .open()
        .await;

    let issues = vitals.diagnostics().check_common_issues().await;
    assert_eq!(issues.len(), 2);
    assert!(issues
        .iter()
        .all(|issue| issue.severity == IssueSeverity::Medium));
}

#[tokio::test]
async fn panicking_probe_degrades_instead_of_failing() {
    let vitals = Vitals::builder(Arc::new(MemoryStore::new()))
        .platform(Arc::new(FixedPlatform { memory: None }))
        .network(Arc::new(PanickingNetwork))
        .open()
        .await;

    let snapshot = vitals.diagnostics().run_diagnostics().await;
    assert!(snapshot.storage_health);
    assert!(!snapshot.network_connectivity);
    assert_eq!(snapshot.network_type, NetworkType::Unknown);
}

#[tokio::test]
async fn failed_diagnostic_run_yields_one_synthetic_issue() {
    let vitals = Vitals::builder(Arc::new(MemoryStore::new()))
        .platform(Arc::new(PanickingPlatform))
        .network(Arc::new(StaticNetwork { connected: true }))
        .open()
        .await;

    let issues = vitals.diagnostics().check_common_issues().await;
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, IssueSeverity::High);
    assert_eq!(issues[0].description, "Failed to run diagnostic check");
}

#[tokio::test]
async fn recovery_trims_only_oversized_buffers() {
    let (vitals, _store) = open_memory().await;
    let resets = Arc::new(AtomicUsize::new(0));
    {
        let resets = Arc::clone(&resets);
        vitals.diagnostics().register_error_state_reset(move || {
            resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    for index in 0..150 {
        vitals.logger().debug(format!("line {index}"), Tags::new());
    }
    for index in 0..5 {
        vitals
            .errors()
            .capture_message(format!("error {index}"), Severity::Warning, Tags::new());
    }

    let result = vitals.diagnostics().perform_recovery_actions().await;

    assert!(result.success);
    assert_eq!(resets.load(Ordering::SeqCst), 1);
    assert!(vitals.logger().is_empty());
    assert_eq!(vitals.errors().len(), 5);
    assert!(result
        .actions_performed
        .iter()
        .any(|action| action == "Cleared old logs"));
    assert!(!result
        .actions_performed
        .iter()
        .any(|action| action == "Cleared old error reports"));
}

#[tokio::test]
async fn failing_reset_callback_marks_recovery_unsuccessful() {
    let (vitals, _store) = open_memory().await;
    vitals
        .diagnostics()
        .register_error_state_reset(|| Err(RecoveryError("screen stuck".into())));

    let result = vitals.diagnostics().perform_recovery_actions().await;

    assert!(!result.success);
    assert!(result
        .actions_performed
        .iter()
        .any(|action| action == "Verified storage"));
}

#[tokio::test]
async fn export_is_redacted_and_written_atomically() {
    let (vitals, _store) = open_memory().await;
    vitals.errors().set_user_id(Some("customer-7".into()));
    vitals
        .errors()
        .capture_message("upload to /home/jdoe/file.bin failed", Severity::Error, Tags::new());

    let json = vitals
        .diagnostics()
        .export_diagnostic_data()
        .await
        .expect("export");
    let bundle: DiagnosticExport = serde_json::from_str(&json).expect("valid bundle");
    assert_eq!(bundle.redaction, RedactionPolicy::Redact);
    assert_eq!(bundle.app_version, "1.2.3");
    assert_eq!(bundle.snapshot.version, "1.2.3");
    let report = &bundle.snapshot.errors[0];
    assert_eq!(report.message, "upload to <path> failed");
    assert_ne!(report.metadata.user_id.as_deref(), Some("customer-7"));
    assert!(!json.contains("bench-rig"));

    let dir = tempdir().expect("temp dir");
    let written = vitals
        .diagnostics()
        .export_to_file(dir.path())
        .await
        .expect("write export");
    assert_eq!(written.parent(), Some(dir.path()));
    let file_name = written
        .file_name()
        .and_then(|name| name.to_str())
        .expect("file name");
    assert!(file_name.starts_with("app_vitals_diagnostics_"));
    let on_disk = std::fs::read_to_string(&written).expect("read export");
    assert!(serde_json::from_str::<DiagnosticExport>(&on_disk).is_ok());
}

#[tokio::test]
async fn clear_all_data_wipes_every_stored_key() {
    let (vitals, store) = open_memory().await;
    store
        .set("host.unrelated", "kept")
        .await
        .expect("seed unrelated key");

    vitals.logger().set_enabled(true);
    vitals.logger().info("one", Tags::new());
    vitals
        .errors()
        .capture_message("two", Severity::Error, Tags::new());
    vitals.sync().await;

    let removed = vitals
        .diagnostics()
        .clear_all_data()
        .await
        .expect("clear all");

    assert!(removed >= 1);
    assert!(vitals.logger().is_empty());
    assert!(vitals.errors().is_empty());
    let remaining = store.snapshot();
    assert_eq!(remaining.len(), 1);
    assert!(remaining.contains_key("host.unrelated"));
}
