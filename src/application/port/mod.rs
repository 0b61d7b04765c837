// SPDX-License-Identifier: MPL-2.0
//! Port definitions (traits) for dependency inversion.
//!
//! This module defines abstract interfaces that infrastructure adapters implement.
//!
//! # Available Ports
//!
//! - [`store`]: Durable asynchronous key-value store
//! - [`platform`]: Device/OS information and memory sampling
//! - [`network`]: Best-effort connectivity query
//! - [`sink`]: Remote ingestion hand-off used by `flush()`
//!
//! # Design Notes
//!
//! - Traits are `Send + Sync` so one provider can be shared by every component
//! - Asynchronous ports use `async_trait` so they stay object safe
//! - Every failure is a `Result`; callers in this crate degrade instead of propagating

pub mod network;
pub mod platform;
pub mod sink;
pub mod store;

pub use network::{NetworkStatus, NetworkStatusProvider, NetworkType};
pub use platform::{device_info_or_unknown, DeviceInfo, PlatformProvider};
pub use sink::{FlushBatch, RemoteSink, SinkError};
pub use store::KeyValueStore;
