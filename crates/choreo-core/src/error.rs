use thiserror::Error;

/// Core error type for the choreography engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Workflow, incident or other record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lifecycle operation not permitted in the current state
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// External collaborator raised or returned an error
    #[error("Collaborator error: {0}")]
    CollaboratorError(String),

    /// Upstream step result lacks data a later step needs
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Input/output error
    #[error("Input/output error: {0}")]
    IOError(String),

    /// Generic error
    #[error("{0}")]
    Internal(String),
}

/// Result alias used across the engine
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// True for the not-found category surfaced to lifecycle callers
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }

    /// True for rejected lifecycle transitions
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, CoreError::InvalidTransition(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::IOError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Internal(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_error_display() {
        let errors = vec![
            (CoreError::NotFound("workflow wf-1".to_string()), "Not found: workflow wf-1"),
            (
                CoreError::InvalidTransition("cannot cancel".to_string()),
                "Invalid transition: cannot cancel",
            ),
            (
                CoreError::CollaboratorError("slack down".to_string()),
                "Collaborator error: slack down",
            ),
            (
                CoreError::MissingDependency("step 3".to_string()),
                "Missing dependency: step 3",
            ),
            (CoreError::ValidationError("invalid".to_string()), "Validation error: invalid"),
            (CoreError::StateStoreError("db_err".to_string()), "State store error: db_err"),
            (CoreError::SerializationError("ser_err".to_string()), "Serialization error: ser_err"),
            (CoreError::ConfigurationError("cfg".to_string()), "Configuration error: cfg"),
            (CoreError::IOError("io_err".to_string()), "Input/output error: io_err"),
            (CoreError::Internal("other_err".to_string()), "other_err"),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_category_helpers() {
        assert!(CoreError::NotFound("x".into()).is_not_found());
        assert!(!CoreError::NotFound("x".into()).is_invalid_transition());
        assert!(CoreError::InvalidTransition("x".into()).is_invalid_transition());
        assert!(!CoreError::CollaboratorError("x".into()).is_not_found());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: CoreError = json_error.into();

        match error {
            CoreError::SerializationError(msg) => assert!(msg.contains("expected value")),
            _ => panic!("Expected SerializationError variant"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_error = IoError::new(ErrorKind::NotFound, "file not found");
        let error: CoreError = io_error.into();

        match error {
            CoreError::IOError(msg) => assert!(msg.contains("file not found")),
            _ => panic!("Expected IOError variant"),
        }
    }

    #[test]
    fn test_from_str_and_string() {
        let from_str: CoreError = "boom".into();
        let from_string: CoreError = "boom".to_string().into();
        assert_eq!(from_str, CoreError::Internal("boom".to_string()));
        assert_eq!(from_str, from_string);
    }
}
