// SPDX-License-Identifier: MPL-2.0
//! `app_vitals` gives an application bounded, persistent logging, error
//! reporting and performance tracing, plus a coordinator that checks health,
//! detects common issues, attempts recovery and exports diagnostics.
//!
//! Storage, device information, connectivity and remote delivery are ports
//! (see [`application::port`]); [`infrastructure`] provides implementations
//! for desktop and server hosts. [`Vitals`] wires everything together.

#![doc(html_root_url = "https://docs.rs/app_vitals/0.3.0")]

pub mod app;
pub mod application;
pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod error;
pub mod infrastructure;
mod vitals;

pub use vitals::{Vitals, VitalsBuilder};
