//! Shared HTTP plumbing for the connectors

use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;

use crate::error::{ConnectorError, ConnectorResult};

/// Build the client every connector shares
pub fn build_client(timeout: Duration) -> ConnectorResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("choreo/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConnectorError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// Decode a JSON body, turning non-2xx statuses into [`ConnectorError::Api`]
pub async fn read_json(service: &'static str, response: Response) -> ConnectorResult<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ConnectorError::Api {
            service,
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| ConnectorError::decode(service, e.to_string()))
}

/// Check the status of a response whose body is not needed
pub async fn ensure_success(service: &'static str, response: Response) -> ConnectorResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(ConnectorError::Api {
        service,
        status: status.as_u16(),
        body,
    })
}

/// Required string field of a JSON document
pub fn str_field(service: &'static str, value: &Value, pointer: &str) -> ConnectorResult<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ConnectorError::decode(service, format!("missing field {}", pointer)))
}
