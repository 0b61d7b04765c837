// SPDX-License-Identifier: MPL-2.0
//! Diagnostics domain types.
//!
//! This module provides pure domain types for diagnostics:
//! - [`BufferCapacity`]: Capacity of a bounded ring buffer
//! - [`LogLevel`], [`Severity`], [`IssueSeverity`]: ordered classifications
//! - [`TagValue`]: primitive attribute value

mod newtypes;

pub use newtypes::{
    buffer_capacity_bounds, BufferCapacity, IssueSeverity, LogLevel, Severity, TagValue, Tags,
};
