// SPDX-License-Identifier: MPL-2.0
use thiserror::Error;

/// Errors raised by the durable key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// The backing store is not reachable (closed, unmounted, quota exceeded).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by platform and network providers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider query failed: {0}")]
    Query(String),
}

/// Crate-level error for configuration and the command-line surface.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O Error: {0}")]
    Io(String),

    #[error("Config Error: {0}")]
    Config(String),

    #[error("Store Error: {0}")]
    Store(#[from] StoreError),

    #[error("Export Error: {0}")]
    Export(#[from] crate::diagnostics::ExportError),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
