// SPDX-License-Identifier: MPL-2.0
//! Leveled application log kept in a persistent ring buffer.
//!
//! Every accepted entry is also emitted through `tracing`, which acts as the
//! local fallback sink. Entries below the minimum level, or any entry while
//! the logger is disabled, are dropped without touching the buffer.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::buffer::{BufferCapacity, PersistentRingBuffer};
use crate::application::port::{FlushBatch, KeyValueStore, RemoteSink};
use crate::domain::diagnostics::{LogLevel, Tags};
use crate::infrastructure::PersisterHandle;

/// Store key holding the serialized log buffer.
pub const LOG_ENTRIES_KEY: &str = "app_vitals.logger.entries";
/// Store key holding `{ enabled, min_level }`.
pub const LOGGER_SETTINGS_KEY: &str = "app_vitals.logger.settings";

/// One recorded log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct LoggerSettings {
    enabled: bool,
    min_level: LogLevel,
}

/// Leveled logger with a bounded, persisted history.
pub struct Logger {
    entries: PersistentRingBuffer<LogEntry>,
    settings: RwLock<LoggerSettings>,
    persister: PersisterHandle,
    sink: Arc<dyn RemoteSink>,
}

impl Logger {
    /// Restores settings and history from `store`.
    ///
    /// `default_level` applies only when no settings were persisted yet.
    pub async fn load(
        capacity: BufferCapacity,
        default_level: LogLevel,
        store: &dyn KeyValueStore,
        persister: PersisterHandle,
        sink: Arc<dyn RemoteSink>,
    ) -> Self {
        let settings = load_settings(store)
            .await
            .unwrap_or(LoggerSettings {
                enabled: true,
                min_level: default_level,
            });
        let entries =
            PersistentRingBuffer::load(LOG_ENTRIES_KEY, capacity, store, persister.clone()).await;

        Self {
            entries,
            settings: RwLock::new(settings),
            persister,
            sink,
        }
    }

    pub fn debug(&self, message: impl Into<String>, tags: Tags) {
        self.log(LogLevel::Debug, message, tags);
    }

    pub fn info(&self, message: impl Into<String>, tags: Tags) {
        self.log(LogLevel::Info, message, tags);
    }

    pub fn warn(&self, message: impl Into<String>, tags: Tags) {
        self.log(LogLevel::Warn, message, tags);
    }

    pub fn error(&self, message: impl Into<String>, tags: Tags) {
        self.log(LogLevel::Error, message, tags);
    }

    /// Records `message` at `level` if the logger accepts it.
    pub fn log(&self, level: LogLevel, message: impl Into<String>, tags: Tags) {
        if !self.should_log(level) {
            return;
        }

        let entry = LogEntry {
            level,
            message: message.into(),
            timestamp: Utc::now(),
            tags,
        };
        emit(&entry);
        self.entries.push(entry);
    }

    /// True when the logger is enabled and `level` is at or above the minimum.
    #[must_use]
    pub fn should_log(&self, level: LogLevel) -> bool {
        let settings = *self.settings.read();
        settings.enabled && level >= settings.min_level
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.update_settings(|settings| settings.enabled = enabled);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.settings.read().enabled
    }

    pub fn set_min_level(&self, level: LogLevel) {
        self.update_settings(|settings| settings.min_level = level);
    }

    #[must_use]
    pub fn min_level(&self) -> LogLevel {
        self.settings.read().min_level
    }

    /// Copy of the buffered entries, oldest first.
    #[must_use]
    pub fn get_logs(&self) -> Vec<LogEntry> {
        self.entries.snapshot()
    }

    /// Empties the buffer and its durable copy. Idempotent.
    pub fn clear_logs(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ships buffered entries to the remote sink.
    ///
    /// Does nothing while disabled or empty. On success the buffer is emptied;
    /// on failure the entries go back into the buffer.
    pub async fn flush(&self) {
        if !self.is_enabled() || self.entries.is_empty() {
            return;
        }

        let batch = self.entries.drain();
        let count = batch.len();
        match self.sink.ship(FlushBatch::Logs(batch.clone())).await {
            Ok(()) => tracing::debug!(count, "flushed log entries"),
            Err(err) => {
                tracing::warn!(count, error = %err, "log flush failed, keeping entries");
                self.entries.restore_front(batch);
            }
        }
    }

    fn update_settings(&self, change: impl FnOnce(&mut LoggerSettings)) {
        let mut settings = self.settings.write();
        change(&mut settings);
        match serde_json::to_string(&*settings) {
            Ok(json) => self.persister.save(LOGGER_SETTINGS_KEY, json),
            Err(err) => tracing::warn!(error = %err, "failed to serialize logger settings"),
        }
    }
}

async fn load_settings(store: &dyn KeyValueStore) -> Option<LoggerSettings> {
    match store.get(LOGGER_SETTINGS_KEY).await {
        Ok(Some(json)) => match serde_json::from_str(&json) {
            Ok(settings) => Some(settings),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unreadable logger settings");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(error = %err, "failed to load logger settings");
            None
        }
    }
}

fn emit(entry: &LogEntry) {
    let message = entry.message.as_str();
    let tags = &entry.tags;
    match entry.level {
        LogLevel::Debug => tracing::debug!(target: "app_vitals::log", ?tags, "{message}"),
        LogLevel::Info => tracing::info!(target: "app_vitals::log", ?tags, "{message}"),
        LogLevel::Warn => tracing::warn!(target: "app_vitals::log", ?tags, "{message}"),
        LogLevel::Error => tracing::error!(target: "app_vitals::log", ?tags, "{message}"),
    }
}
