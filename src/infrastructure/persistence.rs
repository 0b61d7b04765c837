// SPDX-License-Identifier: MPL-2.0
//! Single-writer persistence task.
//!
//! Every durable write issued by the logger, the error reporter and the
//! performance monitor is routed through one task, so writes to a key land in
//! the order they were enqueued even when callers run on different threads.
//! Callers never wait for I/O: [`PersisterHandle::save`] only enqueues.
//!
//! Consecutive writes to the same key that arrive in one batch are coalesced;
//! only the newest one reaches the store. [`PersisterHandle::sync`] acts as a
//! barrier: coalescing never crosses it, and it resolves once every command
//! enqueued before it has been applied.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::application::port::KeyValueStore;

#[derive(Debug)]
enum Command {
    Save { key: String, value: String },
    Remove { key: String },
    Sync(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable sender side of the persistence task.
#[derive(Debug, Clone)]
pub struct PersisterHandle {
    command_tx: mpsc::UnboundedSender<Command>,
}

impl PersisterHandle {
    /// Enqueues a write of `value` under `key`.
    ///
    /// Never blocks and never fails from the caller's point of view; if the
    /// task has stopped the write is dropped with a warning.
    pub fn save(&self, key: &str, value: String) {
        let command = Command::Save {
            key: key.to_string(),
            value,
        };
        if self.command_tx.send(command).is_err() {
            tracing::warn!(key, "persistence task stopped, dropping write");
        }
    }

    /// Enqueues removal of `key`.
    pub fn remove(&self, key: &str) {
        let command = Command::Remove {
            key: key.to_string(),
        };
        if self.command_tx.send(command).is_err() {
            tracing::warn!(key, "persistence task stopped, dropping removal");
        }
    }

    /// Waits until every command enqueued before this call has been applied.
    pub async fn sync(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.command_tx.send(Command::Sync(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Returns true while the task accepts commands.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }
}

/// Owner of the persistence task.
pub struct Persister {
    handle: PersisterHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Persister {
    /// Spawns the persistence task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(store: Arc<dyn KeyValueStore>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(store, command_rx));

        Self {
            handle: PersisterHandle { command_tx },
            task: Mutex::new(Some(task)),
        }
    }

    /// Returns a handle for enqueueing writes.
    #[must_use]
    pub fn handle(&self) -> PersisterHandle {
        self.handle.clone()
    }

    /// Applies everything already enqueued, then stops the task.
    ///
    /// Writes enqueued afterwards are dropped with a warning. Calling this
    /// twice is harmless.
    pub async fn shutdown(&self) {
        let _ = self.handle.command_tx.send(Command::Shutdown);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "persistence task ended abnormally");
            }
        }
    }
}

async fn run(store: Arc<dyn KeyValueStore>, mut command_rx: mpsc::UnboundedReceiver<Command>) {
    let mut batch = Vec::new();

    while let Some(first) = command_rx.recv().await {
        batch.push(first);
        while let Ok(next) = command_rx.try_recv() {
            batch.push(next);
        }

        if apply_batch(store.as_ref(), std::mem::take(&mut batch)).await {
            command_rx.close();
            let mut dropped = 0usize;
            while let Ok(command) = command_rx.try_recv() {
                if let Command::Sync(done) = command {
                    let _ = done.send(());
                } else {
                    dropped += 1;
                }
            }
            if dropped > 0 {
                tracing::warn!(dropped, "persistence task stopped with pending writes");
            }
            break;
        }
    }

    tracing::debug!("persistence task stopped");
}

/// Marks writes superseded by a later write to the same key within one
/// barrier-delimited segment.
fn superseded(batch: &[Command]) -> Vec<bool> {
    let mut skip = vec![false; batch.len()];
    let mut seen: HashSet<&str> = HashSet::new();

    for (index, command) in batch.iter().enumerate().rev() {
        match command {
            Command::Save { key, .. } | Command::Remove { key } => {
                if !seen.insert(key.as_str()) {
                    skip[index] = true;
                }
            }
            Command::Sync(_) | Command::Shutdown => seen.clear(),
        }
    }
    skip
}

/// Applies one batch. Returns true when a shutdown command was reached.
async fn apply_batch(store: &dyn KeyValueStore, batch: Vec<Command>) -> bool {
    let skip = superseded(&batch);
    let mut commands = batch.into_iter().zip(skip);

    while let Some((command, skipped)) = commands.next() {
        match command {
            Command::Save { key, value } => {
                if skipped {
                    continue;
                }
                if let Err(err) = store.set(&key, &value).await {
                    tracing::warn!(key = %key, error = %err, "failed to persist value");
                }
            }
            Command::Remove { key } => {
                if skipped {
                    continue;
                }
                if let Err(err) = store.remove(&key).await {
                    tracing::warn!(key = %key, error = %err, "failed to remove persisted value");
                }
            }
            Command::Sync(done) => {
                let _ = done.send(());
            }
            Command::Shutdown => {
                let mut dropped = 0usize;
                for (command, _) in commands.by_ref() {
                    if let Command::Sync(done) = command {
                        let _ = done.send(());
                    } else {
                        dropped += 1;
                    }
                }
                if dropped > 0 {
                    tracing::warn!(dropped, "persistence task stopped with pending writes");
                }
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::infrastructure::MemoryStore;
    use async_trait::async_trait;

    /// Records every `set` so tests can observe coalescing.
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryStore,
        writes: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl KeyValueStore for RecordingStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.writes.lock().push((key.to_string(), value.to_string()));
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key).await
        }

        async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_keys().await
        }
    }

    #[tokio::test]
    async fn sync_waits_for_pending_writes() {
        let store = MemoryStore::new();
        let persister = Persister::spawn(Arc::new(store.clone()));
        let handle = persister.handle();

        handle.save("a", "1".to_string());
        handle.save("b", "2".to_string());
        handle.sync().await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get("a").map(String::as_str), Some("1"));
        assert_eq!(snapshot.get("b").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn last_write_wins_per_key() {
        let store = MemoryStore::new();
        let persister = Persister::spawn(Arc::new(store.clone()));
        let handle = persister.handle();

        for value in 0..50 {
            handle.save("counter", value.to_string());
        }
        handle.remove("gone");
        handle.save("gone", "back".to_string());
        handle.sync().await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get("counter").map(String::as_str), Some("49"));
        assert_eq!(snapshot.get("gone").map(String::as_str), Some("back"));
    }

    #[test]
    fn coalescing_stops_at_barriers() {
        let (done_tx, _done_rx) = oneshot::channel();
        let batch = vec![
            Command::Save {
                key: "k".into(),
                value: "1".into(),
            },
            Command::Save {
                key: "k".into(),
                value: "2".into(),
            },
            Command::Sync(done_tx),
            Command::Save {
                key: "k".into(),
                value: "3".into(),
            },
        ];

        assert_eq!(superseded(&batch), vec![true, false, false, false]);
    }

    #[tokio::test]
    async fn shutdown_drains_then_rejects() {
        let store = Arc::new(RecordingStore::default());
        let persister = Persister::spawn(store.clone());
        let handle = persister.handle();

        handle.save("before", "x".to_string());
        persister.shutdown().await;

        assert!(!handle.is_running());
        handle.save("after", "y".to_string());
        handle.sync().await;

        let writes = store.writes.lock().clone();
        assert_eq!(writes, vec![("before".to_string(), "x".to_string())]);

        // Second shutdown is a no-op
        persister.shutdown().await;
    }
}
