//! Error types for relink

use thiserror::Error;

use crate::socket::SocketError;

/// Core error type for reconnection management
#[derive(Error, Debug)]
pub enum ReconnectError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No socket factory configured")]
    MissingFactory,

    #[error("Socket construction failed: {0}")]
    Construction(#[source] SocketError),

    #[error("No async runtime available to schedule reconnection")]
    NoRuntime,

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for reconnection operations
pub type Result<T> = std::result::Result<T, ReconnectError>;
