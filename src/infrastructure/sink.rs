// SPDX-License-Identifier: MPL-2.0
//! Default `flush()` destination.

use async_trait::async_trait;

use crate::application::port::{FlushBatch, RemoteSink, SinkError};

/// Accepts every batch and records its size with `tracing`.
///
/// Stands in for a remote collector until the host wires one up.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl RemoteSink for TracingSink {
    async fn ship(&self, batch: FlushBatch) -> Result<(), SinkError> {
        tracing::info!(kind = batch.kind(), count = batch.len(), "flushed batch");
        Ok(())
    }
}
