// SPDX-License-Identifier: MPL-2.0
//! Network status derived from interface counters.
//!
//! An interface counts as "up" when it is not a loopback device and has moved
//! traffic since boot. The interface name decides the network type.

use async_trait::async_trait;
use sysinfo::Networks;

use crate::application::port::{NetworkStatus, NetworkStatusProvider, NetworkType};
use crate::error::ProviderError;

/// Connectivity provider for desktop and server hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNetworkStatus;

impl SystemNetworkStatus {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Maps an interface name to a network type.
pub(crate) fn classify_interface(name: &str) -> Option<NetworkType> {
    let lower = name.to_ascii_lowercase();
    if lower == "lo" || lower.starts_with("lo0") || lower.contains("loopback") {
        return None;
    }
    if lower.starts_with("wl") || lower.contains("wi-fi") || lower.contains("wifi") {
        return Some(NetworkType::Wifi);
    }
    if lower.starts_with("wwan") || lower.starts_with("rmnet") || lower.starts_with("pdp_ip") {
        return Some(NetworkType::Cellular);
    }
    if lower.starts_with("en") || lower.starts_with("eth") || lower.contains("ethernet") {
        return Some(NetworkType::Ethernet);
    }
    Some(NetworkType::Unknown)
}

/// Picks the most specific type among active interfaces.
pub(crate) fn summarize<'a>(
    interfaces: impl IntoIterator<Item = (&'a str, u64)>,
) -> NetworkStatus {
    let mut best: Option<NetworkType> = None;

    for (name, traffic) in interfaces {
        if traffic == 0 {
            continue;
        }
        let Some(kind) = classify_interface(name) else {
            continue;
        };
        best = match (best, kind) {
            (None, kind) => Some(kind),
            (Some(NetworkType::Unknown), kind) => Some(kind),
            (current, _) => current,
        };
    }

    match best {
        Some(network_type) => NetworkStatus {
            connected: true,
            network_type,
        },
        None => NetworkStatus {
            connected: false,
            network_type: NetworkType::None,
        },
    }
}

#[async_trait]
impl NetworkStatusProvider for SystemNetworkStatus {
    async fn status(&self) -> Result<NetworkStatus, ProviderError> {
        tokio::task::spawn_blocking(|| {
            let networks = Networks::new_with_refreshed_list();
            let counters: Vec<(String, u64)> = networks
                .iter()
                .map(|(name, data)| {
                    (
                        name.clone(),
                        data.total_received()
                            .saturating_add(data.total_transmitted()),
                    )
                })
                .collect();
            summarize(counters.iter().map(|(name, traffic)| (name.as_str(), *traffic)))
        })
        .await
        .map_err(|err| ProviderError::Query(err.to_string()))
    }
}
