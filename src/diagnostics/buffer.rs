// SPDX-License-Identifier: MPL-2.0
//! Bounded ring buffers for logs, error reports and metrics.
//!
//! [`CircularBuffer`] is the plain in-memory structure. [`PersistentRingBuffer`]
//! wraps one behind a mutex and mirrors every mutation to the key-value store
//! through the persistence task, so the durable copy always equals the
//! in-memory contents once pending writes are applied.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::ser::{Serialize, Serializer};

use crate::application::port::KeyValueStore;
use crate::infrastructure::PersisterHandle;

pub use crate::domain::diagnostics::BufferCapacity;

/// A generic circular buffer with fixed capacity.
///
/// When the buffer is full, pushing a new element evicts the oldest one.
/// Elements are stored in chronological order (oldest first).
///
/// # Example
///
/// ```
/// use app_vitals::diagnostics::{BufferCapacity, CircularBuffer};
///
/// let mut buffer: CircularBuffer<i32> = CircularBuffer::new(BufferCapacity::new(2));
///
/// buffer.push(1);
/// buffer.push(2);
/// buffer.push(3);
///
/// let items: Vec<_> = buffer.iter().copied().collect();
/// assert_eq!(items, vec![2, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> CircularBuffer<T> {
    /// Creates a new circular buffer with the specified capacity.
    #[must_use]
    pub fn new(capacity: BufferCapacity) -> Self {
        Self::with_raw_capacity(capacity.value())
    }

    /// Creates a new circular buffer with a raw capacity value.
    ///
    /// For production use, prefer [`CircularBuffer::new`] with [`BufferCapacity`].
    #[must_use]
    pub fn with_raw_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Pushes an element to the buffer, evicting the oldest if at capacity.
    pub fn push(&mut self, item: T) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(item);
    }

    /// Returns an iterator over the elements in chronological order (oldest first).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Removes and returns every element, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.data.drain(..).collect()
    }

    /// Puts `items` back in front of the current contents.
    ///
    /// Used when a flush fails after draining. If the combined length exceeds
    /// capacity, the oldest elements are dropped; returns how many.
    pub fn restore_front(&mut self, items: Vec<T>) -> usize {
        for item in items.into_iter().rev() {
            self.data.push_front(item);
        }
        let overflow = self.data.len().saturating_sub(self.capacity);
        self.data.drain(..overflow);
        overflow
    }
}

impl<T> Extend<T> for CircularBuffer<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

impl<T: Serialize> Serialize for CircularBuffer<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.data.iter())
    }
}

/// A [`CircularBuffer`] mirrored to one key of the key-value store.
///
/// All mutations serialize the buffer and enqueue the write while the lock is
/// held, so concurrent writers reach the store in the same order they changed
/// the buffer.
pub struct PersistentRingBuffer<T> {
    key: &'static str,
    inner: Mutex<CircularBuffer<T>>,
    persister: PersisterHandle,
}

impl<T> PersistentRingBuffer<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    /// Restores the buffer from `store`, keeping only the newest `capacity`
    /// entries. Unreadable records are skipped; missing or malformed data
    /// starts an empty buffer.
    pub async fn load(
        key: &'static str,
        capacity: BufferCapacity,
        store: &dyn KeyValueStore,
        persister: PersisterHandle,
    ) -> Self {
        let mut buffer = CircularBuffer::new(capacity);

        match store.get(key).await {
            Ok(Some(json)) => match serde_json::from_str::<Vec<serde_json::Value>>(&json) {
                Ok(records) => {
                    let total = records.len();
                    let items: Vec<T> = records
                        .into_iter()
                        .filter_map(|record| serde_json::from_value(record).ok())
                        .collect();
                    let skipped = total - items.len();
                    buffer.extend(items);
                    if skipped > 0 {
                        tracing::warn!(key, skipped, "skipped unreadable persisted records");
                    }
                }
                Err(err) => {
                    tracing::warn!(key, error = %err, "discarding unreadable persisted buffer");
                }
            },
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to load persisted buffer");
            }
        }

        Self {
            key,
            inner: Mutex::new(buffer),
            persister,
        }
    }

    /// Appends `item`, evicting the oldest entry when full.
    pub fn push(&self, item: T) {
        let mut buffer = self.inner.lock();
        buffer.push(item);
        self.persist(&buffer);
    }

    /// Point-in-time copy of the contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    /// Empties the buffer and its durable copy.
    pub fn clear(&self) {
        let mut buffer = self.inner.lock();
        buffer.clear();
        self.persister.remove(self.key);
    }

    /// Takes every entry out of the buffer, leaving it empty.
    pub fn drain(&self) -> Vec<T> {
        let mut buffer = self.inner.lock();
        let items = buffer.drain();
        self.persister.remove(self.key);
        items
    }

    /// Re-inserts previously drained entries ahead of anything pushed since.
    pub fn restore_front(&self, items: Vec<T>) {
        let mut buffer = self.inner.lock();
        let dropped = buffer.restore_front(items);
        if dropped > 0 {
            tracing::debug!(key = self.key, dropped, "buffer overflowed while restoring entries");
        }
        self.persist(&buffer);
    }

    fn persist(&self, buffer: &CircularBuffer<T>) {
        if buffer.is_empty() {
            self.persister.remove(self.key);
            return;
        }
        match serde_json::to_string(buffer) {
            Ok(json) => self.persister.save(self.key, json),
            Err(err) => {
                tracing::warn!(key = self.key, error = %err, "failed to serialize buffer");
            }
        }
    }
}
