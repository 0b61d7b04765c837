// SPDX-License-Identifier: MPL-2.0
//! Domain layer - pure value types shared by every component.
//!
//! Types here carry no I/O and no runtime state; only `serde` derives so they
//! can be persisted and exported as-is.
//!
//! # Modules
//!
//! - [`diagnostics`]: Diagnostics types ([`BufferCapacity`](diagnostics::BufferCapacity),
//!   [`LogLevel`](diagnostics::LogLevel), [`Severity`](diagnostics::Severity))

pub mod diagnostics;
