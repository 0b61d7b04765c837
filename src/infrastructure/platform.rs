// SPDX-License-Identifier: MPL-2.0
//! Platform information backed by `sysinfo`.

use std::sync::OnceLock;

use parking_lot::Mutex;
use sysinfo::System;

use crate::application::port::{DeviceInfo, PlatformProvider};
use crate::error::ProviderError;

/// Host platform provider.
///
/// Device information is collected once and cached; memory usage is sampled
/// fresh on every call.
pub struct SystemPlatform {
    app_version: String,
    device: OnceLock<DeviceInfo>,
    system: Mutex<System>,
}

impl SystemPlatform {
    /// Creates a provider reporting the given application version.
    #[must_use]
    pub fn new(app_version: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
            device: OnceLock::new(),
            system: Mutex::new(System::new()),
        }
    }

    fn collect_device_info(&self) -> DeviceInfo {
        let mut sys = System::new();
        sys.refresh_cpu_all();

        let cpu_brand = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        DeviceInfo {
            platform: std::env::consts::OS.to_string(),
            os_version: System::long_os_version()
                .or_else(System::os_version)
                .unwrap_or_else(|| "unknown".to_string()),
            app_version: self.app_version.clone(),
            device_model: format!("{cpu_brand} ({})", std::env::consts::ARCH),
        }
    }
}

impl Default for SystemPlatform {
    fn default() -> Self {
        Self::new("unknown")
    }
}

impl PlatformProvider for SystemPlatform {
    fn device_info(&self) -> Result<DeviceInfo, ProviderError> {
        Ok(self
            .device
            .get_or_init(|| self.collect_device_info())
            .clone())
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn memory_usage_percent(&self) -> Option<f32> {
        let mut sys = self.system.lock();
        sys.refresh_memory();

        let total = sys.total_memory();
        if total == 0 {
            return None;
        }
        Some((sys.used_memory() as f64 / total as f64 * 100.0) as f32)
    }
}
