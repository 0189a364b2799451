//! Error types for the connectors
//!
//! Every connector failure ends up as a step failure, so the only consumer of
//! these variants is the conversion into `CoreError::CollaboratorError`.

use choreo_core::CoreError;
use thiserror::Error;

/// Connector error types
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Transport failure: connect, timeout, TLS
    #[error("{service} request failed: {message}")]
    Http {
        /// Remote system
        service: &'static str,
        /// Underlying error text
        message: String,
    },

    /// The remote system answered with an error
    #[error("{service} returned {status}: {body}")]
    Api {
        /// Remote system
        service: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body or API error code
        body: String,
    },

    /// The response did not have the expected shape
    #[error("{service} response could not be decoded: {message}")]
    Decode {
        /// Remote system
        service: &'static str,
        /// What was wrong
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;

impl ConnectorError {
    /// Wrap a transport error for `service`
    pub fn http(service: &'static str, err: reqwest::Error) -> Self {
        ConnectorError::Http {
            service,
            message: err.to_string(),
        }
    }

    /// Wrap a decoding problem for `service`
    pub fn decode(service: &'static str, message: impl Into<String>) -> Self {
        ConnectorError::Decode {
            service,
            message: message.into(),
        }
    }
}

impl From<ConnectorError> for CoreError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::Configuration(msg) => CoreError::ConfigurationError(msg),
            other => CoreError::CollaboratorError(other.to_string()),
        }
    }
}
