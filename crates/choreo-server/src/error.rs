//! Error types for the choreography server

use choreo_connectors::ConnectorError;
use choreo_core::CoreError;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    /// Engine error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Connector setup error
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// Request validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Listener or socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// True when the underlying engine reported a missing record
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServerError::Core(e) if e.is_not_found())
    }
}
