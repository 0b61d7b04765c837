// SPDX-License-Identifier: MPL-2.0
//! Durable key-value store port.
//!
//! Values are opaque strings; callers serialize their own records. Every
//! component of this crate owns a disjoint set of keys, so no record-level
//! locking is required by implementations.

use async_trait::async_trait;

use crate::error::StoreError;

/// Asynchronous, fallible key-value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value, or `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Lists every key currently stored.
    async fn list_keys(&self) -> Result<Vec<String>, StoreError>;
}
