// SPDX-License-Identifier: MPL-2.0
//! Device and platform information port.

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Read-only description of the host device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Platform family (e.g., "linux", "windows", "macos", "android").
    pub platform: String,
    pub os_version: String,
    pub app_version: String,
    pub device_model: String,
}

impl DeviceInfo {
    /// Placeholder used when the provider fails.
    #[must_use]
    pub fn unknown(app_version: impl Into<String>) -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            os_version: "unknown".to_string(),
            app_version: app_version.into(),
            device_model: "unknown".to_string(),
        }
    }
}

/// Provides device information and, where the host exposes it, memory usage.
pub trait PlatformProvider: Send + Sync {
    /// Queried at report time; implementations may cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the host refuses the query.
    fn device_info(&self) -> Result<DeviceInfo, ProviderError>;

    /// Memory usage in percent (0.0–100.0), or `None` if the host has no such sample.
    fn memory_usage_percent(&self) -> Option<f32> {
        None
    }
}

/// Queries `platform`, falling back to [`DeviceInfo::unknown`] when the
/// provider fails or panics.
pub fn device_info_or_unknown(platform: &dyn PlatformProvider, app_version: &str) -> DeviceInfo {
    match panic::catch_unwind(AssertUnwindSafe(|| platform.device_info())) {
        Ok(Ok(info)) => info,
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "device info unavailable");
            DeviceInfo::unknown(app_version)
        }
        Err(_) => {
            tracing::warn!("platform provider panicked");
            DeviceInfo::unknown(app_version)
        }
    }
}
