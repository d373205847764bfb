//! Error types for the ordering service

use thiserror::Error;

/// Result type for orderer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Orderer errors
#[derive(Error, Debug)]
pub enum Error {
    /// Tree construction or proof failure
    #[error("Merkle error: {0}")]
    Merkle(#[from] merkle_core::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// gRPC transport error
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Listen address could not be parsed
    #[error("Invalid address: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(format!("Failed to parse config: {}", err))
    }
}
