//! Observability setup for the choreography engine.

use serde::{Deserialize, Serialize};

pub mod logging;
pub use logging::{init_logging, init_test_tracing, LogExt};

/// Configuration for initializing logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Service name attached to the startup log line
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Log level filter (e.g., "info,choreo_core=debug"), overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub enable_json_logging: bool,
}

fn default_service_name() -> String {
    "choreo".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_filter: default_log_filter(),
            environment: default_environment(),
            enable_json_logging: false,
        }
    }
}

impl MonitoringConfig {
    /// Config for `service_name` in `environment`; production logs as JSON
    pub fn for_environment(
        service_name: impl Into<String>,
        environment: impl Into<String>,
        log_filter: impl Into<String>,
    ) -> Self {
        let environment = environment.into();
        Self {
            service_name: service_name.into(),
            log_filter: log_filter.into(),
            enable_json_logging: environment.eq_ignore_ascii_case("production"),
            environment,
        }
    }
}
