// SPDX-License-Identifier: MPL-2.0
//! One-stop construction of all diagnostics components.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use app_vitals::domain::diagnostics::{Severity, Tags};
//! use app_vitals::infrastructure::FileStore;
//! use app_vitals::Vitals;
//!
//! # async fn run() {
//! let vitals = Vitals::builder(Arc::new(FileStore::new("/var/lib/my_app/vitals")))
//!     .app_version(env!("CARGO_PKG_VERSION"))
//!     .capture_panics(true)
//!     .open()
//!     .await;
//!
//! vitals.logger().info("started", Tags::new());
//! vitals.errors().capture_message("cache miss storm", Severity::Warning, Tags::new());
//! let issues = vitals.diagnostics().check_common_issues().await;
//! # let _ = issues;
//! vitals.shutdown().await;
//! # }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::application::port::{KeyValueStore, NetworkStatusProvider, PlatformProvider, RemoteSink};
use crate::config::Config;
use crate::diagnostics::{
    Diagnostics, DiagnosticsParts, DiagnosticsThresholds, ErrorReporter, Logger,
    PanicHookRegistration, PerformanceMonitor, TraceOptions,
};
use crate::infrastructure::{Persister, SystemNetworkStatus, SystemPlatform, TracingSink};

/// Logger, error reporter, performance monitor and coordinator sharing one
/// store and one persistence task.
pub struct Vitals {
    logger: Arc<Logger>,
    errors: Arc<ErrorReporter>,
    performance: Arc<PerformanceMonitor>,
    diagnostics: Diagnostics,
    persister: Persister,
    panic_hook: Mutex<Option<PanicHookRegistration>>,
}

impl Vitals {
    /// Starts building a bundle backed by `store`.
    #[must_use]
    pub fn builder(store: Arc<dyn KeyValueStore>) -> VitalsBuilder {
        VitalsBuilder {
            store,
            config: Config::default(),
            app_version: None,
            platform: None,
            network: None,
            sink: None,
            capture_panics: false,
        }
    }

    #[must_use]
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    #[must_use]
    pub fn errors(&self) -> &Arc<ErrorReporter> {
        &self.errors
    }

    #[must_use]
    pub fn performance(&self) -> &Arc<PerformanceMonitor> {
        &self.performance
    }

    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Flushes all three buffers to the remote sink concurrently.
    pub async fn flush(&self) {
        tokio::join!(
            self.logger.flush(),
            self.errors.flush(),
            self.performance.flush()
        );
    }

    /// Waits until every write issued so far has reached the store.
    pub async fn sync(&self) {
        self.persister.handle().sync().await;
    }

    /// Removes the panic hook handler and stops the persistence task after
    /// applying pending writes. Later mutations stay in memory only.
    pub async fn shutdown(&self) {
        self.panic_hook.lock().take();
        self.persister.shutdown().await;
    }
}

/// Builder returned by [`Vitals::builder`].
#[must_use]
pub struct VitalsBuilder {
    store: Arc<dyn KeyValueStore>,
    config: Config,
    app_version: Option<String>,
    platform: Option<Arc<dyn PlatformProvider>>,
    network: Option<Arc<dyn NetworkStatusProvider>>,
    sink: Option<Arc<dyn RemoteSink>>,
    capture_panics: bool,
}

impl VitalsBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Version of the host application. Used by the default platform provider
    /// and whenever a provider cannot be queried. Defaults to `"unknown"`.
    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    /// Defaults to [`SystemPlatform`].
    pub fn platform(mut self, platform: Arc<dyn PlatformProvider>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Defaults to [`SystemNetworkStatus`].
    pub fn network(mut self, network: Arc<dyn NetworkStatusProvider>) -> Self {
        self.network = Some(network);
        self
    }

    /// Defaults to [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn RemoteSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Report every panic in the process as a fatal error.
    pub fn capture_panics(mut self, enabled: bool) -> Self {
        self.capture_panics = enabled;
        self
    }

    /// Restores persisted state and spawns the persistence task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub async fn open(self) -> Vitals {
        let Self {
            store,
            config,
            app_version,
            platform,
            network,
            sink,
            capture_panics,
        } = self;

        let app_version = app_version.unwrap_or_else(|| "unknown".to_string());
        let platform =
            platform.unwrap_or_else(|| Arc::new(SystemPlatform::new(app_version.as_str())));
        let network = network.unwrap_or_else(|| Arc::new(SystemNetworkStatus::new()));
        let sink = sink.unwrap_or_else(|| Arc::new(TracingSink));

        let persister = Persister::spawn(Arc::clone(&store));
        let handle = persister.handle();

        let logger = Arc::new(
            Logger::load(
                config.logger_capacity,
                config.default_log_level,
                store.as_ref(),
                handle.clone(),
                Arc::clone(&sink),
            )
            .await,
        );
        let errors = Arc::new(
            ErrorReporter::load(
                config.error_capacity,
                store.as_ref(),
                handle.clone(),
                Arc::clone(&platform),
                app_version.as_str(),
                Arc::clone(&network),
                Arc::clone(&sink),
            )
            .await,
        );
        let performance = Arc::new(
            PerformanceMonitor::load(
                config.performance_capacity,
                TraceOptions {
                    duplicate_policy: config.duplicate_trace_policy,
                    stale_after: config.stale_trace_max_age(),
                },
                store.as_ref(),
                handle.clone(),
                sink,
            )
            .await,
        );

        let diagnostics = Diagnostics::new(
            DiagnosticsParts {
                logger: Arc::clone(&logger),
                reporter: Arc::clone(&errors),
                performance: Arc::clone(&performance),
                store,
                platform,
                network,
                persister: handle,
                app_version,
            },
            DiagnosticsThresholds::from(&config),
            config.export_redaction,
        );

        let panic_hook = capture_panics.then(|| errors.install_panic_hook());
        tracing::debug!(
            logs = logger.len(),
            reports = errors.len(),
            metrics = performance.len(),
            "diagnostics state restored"
        );

        Vitals {
            logger,
            errors,
            performance,
            diagnostics,
            persister,
            panic_hook: Mutex::new(panic_hook),
        }
    }
}
