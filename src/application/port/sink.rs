// SPDX-License-Identifier: MPL-2.0
//! Remote ingestion hand-off used by `flush()`.
//!
//! The wire format belongs to the collector; this crate only hands over a
//! typed batch and clears its buffer once the sink accepts it.

use async_trait::async_trait;
use thiserror::Error;

use crate::diagnostics::{ErrorReport, LogEntry, PerformanceMetric};

/// Batch drained from one component's buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum FlushBatch {
    Logs(Vec<LogEntry>),
    ErrorReports(Vec<ErrorReport>),
    Metrics(Vec<PerformanceMetric>),
}

impl FlushBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Logs(entries) => entries.len(),
            Self::ErrorReports(reports) => reports.len(),
            Self::Metrics(metrics) => metrics.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Logs(_) => "logs",
            Self::ErrorReports(_) => "error_reports",
            Self::Metrics(_) => "metrics",
        }
    }
}

/// The collector rejected or could not receive a batch.
#[derive(Debug, Clone, Error)]
#[error("remote sink rejected batch: {0}")]
pub struct SinkError(pub String);

/// Destination for flushed batches.
#[async_trait]
pub trait RemoteSink: Send + Sync {
    /// Ships one batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch was not accepted; the caller keeps the
    /// entries buffered.
    async fn ship(&self, batch: FlushBatch) -> Result<(), SinkError>;
}
