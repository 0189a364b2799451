//! Configuration for the choreography server
//!
//! This module contains the configuration types and loading functionality.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::warn;

use crate::error::{ServerError, ServerResult};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Deployment environment; `production` switches logs to JSON
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Pause between workflow steps in milliseconds, 0 disables it
    #[serde(default)]
    pub step_delay_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            environment: default_environment(),
            step_delay_ms: 0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn load() -> ServerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, starting from defaults
    pub fn from_lookup<F>(lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("SERVER_HOST") {
            config.host = host;
        }

        if let Some(port) = lookup("SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.port = port;
            } else {
                warn!("Invalid SERVER_PORT value: {}", port);
            }
        }

        if let Some(log_level) = lookup("LOG_LEVEL") {
            config.log_level = log_level;
        }

        if let Some(environment) = lookup("APP_ENV") {
            config.environment = environment;
        }

        if let Some(delay) = lookup("STEP_DELAY_MS") {
            if let Ok(delay) = delay.parse::<u64>() {
                config.step_delay_ms = delay;
            } else {
                warn!("Invalid STEP_DELAY_MS value: {}", delay);
            }
        }

        // Validate required fields
        if config.host.trim().is_empty() {
            return Err(ServerError::ConfigError("SERVER_HOST must not be empty".to_string()));
        }

        Ok(config)
    }

    /// Address to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Pause between steps
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    /// True for the production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> ServerResult<ServerConfig> {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        ServerConfig::from_lookup(|key| map.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.step_delay(), Duration::ZERO);
        assert!(!config.is_production());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = load(&[
            ("SERVER_PORT", "not-a-port"),
            ("STEP_DELAY_MS", "250"),
            ("APP_ENV", "production"),
        ])
        .unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.step_delay(), Duration::from_millis(250));
        assert!(config.is_production());
    }

    #[test]
    fn test_empty_host_is_rejected() {
        assert!(matches!(
            load(&[("SERVER_HOST", " ")]),
            Err(ServerError::ConfigError(_))
        ));
    }
}
