//! Daemon error types.

use aical_core::TracingError;
use aical_gateway::GatewayError;
use aical_store::StoreError;
use aical_sync::{SchedulerError, SyncError};
use thiserror::Error;

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Errors that stop a command.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration file missing pieces or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("gateway setup failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// A foreground sync cycle aborted.
    #[error("sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("tracing setup failed: {0}")]
    Tracing(#[from] TracingError),

    /// Bad command-line value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<toml::de::Error> for DaemonError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("failed to parse config: {}", err))
    }
}
