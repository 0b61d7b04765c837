// SPDX-License-Identifier: MPL-2.0
//! In-process observability: logging, error capture, performance traces and
//! a coordinator that checks health, detects issues, recovers and exports.
//!
//! # Architecture
//!
//! - [`Logger`]: leveled log with persisted enabled/minimum-level settings
//! - [`ErrorReporter`]: captured errors enriched with session and device context
//! - [`PerformanceMonitor`]: named traces and directly recorded metrics
//! - [`Diagnostics`]: health snapshot, issue rules, recovery and export
//!
//! Each component keeps its data in a [`PersistentRingBuffer`]: a bounded
//! FIFO whose contents are mirrored to the key-value store by the single
//! persistence task, so the oldest entry is evicted first and a restart
//! resumes with what was buffered before.
//!
//! # Privacy
//!
//! Exports are scrubbed by default (see [`RedactionPolicy`]). User ids and
//! device models are hashed; paths, e-mail addresses, IP addresses and host
//! names are removed from free text.

mod buffer;
mod coordinator;
mod error_reporter;
mod export;
mod logger;
pub mod panic_hook;
mod performance;
mod privacy;
mod report;

pub use buffer::{BufferCapacity, CircularBuffer, PersistentRingBuffer};
pub use coordinator::{
    detect_issues, Diagnostics, DiagnosticsParts, DiagnosticsThresholds, ErrorStateReset,
    RecoveryError, KEY_PREFIX, STORAGE_SENTINEL_KEY,
};
pub use error_reporter::{
    ErrorMetadata, ErrorReport, ErrorReporter, ERROR_REPORTS_KEY, ERROR_SETTINGS_KEY,
};
pub use export::{
    apply_redaction, generate_default_filename, redact_snapshot, write_atomic, ExportError,
    RedactionPolicy,
};
pub use logger::{LogEntry, Logger, LOGGER_SETTINGS_KEY, LOG_ENTRIES_KEY};
pub use panic_hook::{PanicHookRegistration, PanicReport};
pub use performance::{
    ActiveTrace, DuplicateTracePolicy, PerformanceMetric, PerformanceMonitor, TraceGuard,
    TraceOptions, PERFORMANCE_METRICS_KEY, PERFORMANCE_SETTINGS_KEY,
};
pub use privacy::{sanitize_message, IdentityAnonymizer};
pub use report::{DiagnosticExport, DiagnosticSnapshot, Issue, RecoveryResult};
