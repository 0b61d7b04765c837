// SPDX-License-Identifier: MPL-2.0
//! Network status port.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Kind of network the device is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    Wifi,
    Cellular,
    Ethernet,
    None,
    #[default]
    Unknown,
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Wifi => "wifi",
            Self::Cellular => "cellular",
            Self::Ethernet => "ethernet",
            Self::None => "none",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Result of a connectivity query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub connected: bool,
    pub network_type: NetworkType,
}

impl NetworkStatus {
    /// Status reported when the provider fails.
    pub const UNKNOWN: Self = Self {
        connected: false,
        network_type: NetworkType::Unknown,
    };
}

/// Best-effort connectivity provider.
#[async_trait]
pub trait NetworkStatusProvider: Send + Sync {
    /// Queries the current connectivity.
    ///
    /// # Errors
    ///
    /// Returns an error if the status cannot be determined; callers degrade
    /// to [`NetworkStatus::UNKNOWN`].
    async fn status(&self) -> Result<NetworkStatus, ProviderError>;
}
