// SPDX-License-Identifier: MPL-2.0
//! Application layer - port traits the diagnostics services depend on.
//!
//! - [`port`]: Trait definitions (interfaces) for dependency inversion
//!
//! # Dependency Rule
//!
//! - The diagnostics services depend only on these ports
//! - The infrastructure layer implements them
//! - Tests substitute in-memory or deliberately failing doubles

pub mod port;
