//! Error types for the client crate.

use ha_ble_protocol::ProtocolError;
use thiserror::Error;

use crate::dispatcher::DispatcherState;

/// Errors returned to the host by the dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The notification could not be parsed as a frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A device-list exchange is already in flight.
    #[error("exchange already in flight (state: {0})")]
    Busy(DispatcherState),
}

/// Result type alias for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors loading an [`EngineConfig`](crate::EngineConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The YAML did not match the configuration schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
