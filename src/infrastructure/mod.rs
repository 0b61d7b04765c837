// SPDX-License-Identifier: MPL-2.0
//! Infrastructure layer adapters.
//!
//! This module contains concrete implementations of the port traits defined in
//! `application::port`, plus the single-writer persistence task every
//! component routes its durable writes through.
//!
//! # Available Adapters
//!
//! - [`store`]: [`FileStore`] (one file per key) and [`MemoryStore`]
//! - [`platform`]: [`SystemPlatform`] backed by `sysinfo`
//! - [`network`]: [`SystemNetworkStatus`] backed by `sysinfo` interface counters
//! - [`sink`]: [`TracingSink`], the default `flush()` destination
//! - [`persistence`]: [`Persister`] actor and its cloneable [`PersisterHandle`]

pub mod network;
pub mod persistence;
pub mod platform;
pub mod sink;
pub mod store;

pub use network::SystemNetworkStatus;
pub use persistence::{Persister, PersisterHandle};
pub use platform::SystemPlatform;
pub use sink::TracingSink;
pub use store::{FileStore, MemoryStore};
