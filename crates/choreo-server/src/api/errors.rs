//! Error handling for the choreography API
//!
//! Every failure leaves the API as the same JSON envelope.

use axum::{http::StatusCode, response::IntoResponse, Json};
use choreo_core::CoreError;
use serde_json::json;
use tracing::error;

use crate::error::ServerError;

/// API Error type for returning standard error responses
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),
    /// Not found (404)
    NotFound(String),
    /// Conflict with the current lifecycle state (409)
    Conflict(String),
    /// Internal server error (500)
    InternalServerError(String),
    /// Wrapped server error
    ServerError(ServerError),
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        ApiError::ServerError(err)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::ServerError(ServerError::Core(err))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ServerError(err) => write!(f, "Server Error: {}", err),
        }
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "ERR_BAD_REQUEST", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "ERR_CONFLICT", msg.clone()),
            ApiError::InternalServerError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ERR_INTERNAL_SERVER_ERROR",
                msg.clone(),
            ),
            ApiError::ServerError(err) => server_error_parts(err),
        }
    }
}

fn server_error_parts(err: &ServerError) -> (StatusCode, &'static str, String) {
    match err {
        ServerError::Core(core) => match core {
            CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND", core.to_string()),
            CoreError::InvalidTransition(_) => (
                StatusCode::CONFLICT,
                "ERR_INVALID_TRANSITION",
                core.to_string(),
            ),
            CoreError::ValidationError(_) => (
                StatusCode::BAD_REQUEST,
                "ERR_VALIDATION_ERROR",
                core.to_string(),
            ),
            CoreError::StateStoreError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ERR_STATE_STORE_ERROR",
                core.to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ERR_RUNTIME_ERROR",
                core.to_string(),
            ),
        },
        ServerError::ValidationError(msg) => {
            (StatusCode::BAD_REQUEST, "ERR_VALIDATION_ERROR", msg.clone())
        }
        ServerError::Connector(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_CONNECTOR_ERROR",
            e.to_string(),
        ),
        ServerError::ConfigError(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_CONFIG_ERROR",
            msg.clone(),
        ),
        ServerError::Io(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_INTERNAL_SERVER_ERROR",
            e.to_string(),
        ),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code, message) = self.parts();

        if status.is_server_error() {
            error!(error_code, error = %message, "Request failed");
        }

        let body = Json(json!({
            "error": message,
            "errorDetails": {
                "errorCode": error_code,
                "errorMessage": message,
            }
        }));

        (status, body).into_response()
    }
}
