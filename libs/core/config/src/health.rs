use crate::{env_or_default, ConfigError, FromEnv};
use std::env;
use std::net::Ipv4Addr;

const DEFAULT_HEALTH_PORT: u16 = 8083;

/// Bind address for a worker's health/metrics HTTP server
#[derive(Clone, Debug)]
pub struct HealthServerConfig {
    pub host: String,
    pub port: u16,
}

impl HealthServerConfig {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Like [`FromEnv::from_env`], but checks a service-specific port
    /// variable before the shared `HEALTH_PORT`.
    pub fn from_env_with_port_key(port_key: &str) -> Result<Self, ConfigError> {
        let host = env_or_default("HEALTH_HOST", &Ipv4Addr::UNSPECIFIED.to_string());

        let (key, raw) = match env::var(port_key) {
            Ok(value) => (port_key.to_string(), value),
            Err(_) => match env::var("HEALTH_PORT") {
                Ok(value) => ("HEALTH_PORT".to_string(), value),
                Err(_) => return Ok(Self::new(host, DEFAULT_HEALTH_PORT)),
            },
        };

        let port = raw.parse().map_err(|e| ConfigError::ParseError {
            key,
            details: format!("{}", e),
        })?;

        Ok(Self { host, port })
    }
}

impl FromEnv for HealthServerConfig {
    /// Reads from environment variables with sensible defaults:
    /// - HEALTH_HOST: defaults to 0.0.0.0
    /// - HEALTH_PORT: defaults to 8083
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_port_key("HEALTH_PORT")
    }
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::UNSPECIFIED.to_string(),
            port: DEFAULT_HEALTH_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_config_defaults() {
        temp_env::with_vars(
            [
                ("HEALTH_HOST", None::<&str>),
                ("HEALTH_PORT", None::<&str>),
                ("RAG_WORKER_HEALTH_PORT", None::<&str>),
            ],
            || {
                let config =
                    HealthServerConfig::from_env_with_port_key("RAG_WORKER_HEALTH_PORT").unwrap();
                assert_eq!(config.host, "0.0.0.0");
                assert_eq!(config.port, 8083);
                assert_eq!(config.address(), "0.0.0.0:8083");
            },
        );
    }

    #[test]
    fn test_service_port_takes_precedence() {
        temp_env::with_vars(
            [
                ("HEALTH_PORT", Some("9000")),
                ("RAG_WORKER_HEALTH_PORT", Some("9100")),
            ],
            || {
                let config =
                    HealthServerConfig::from_env_with_port_key("RAG_WORKER_HEALTH_PORT").unwrap();
                assert_eq!(config.port, 9100);
            },
        );
    }

    #[test]
    fn test_shared_port_fallback() {
        temp_env::with_vars(
            [
                ("HEALTH_PORT", Some("9000")),
                ("RAG_WORKER_HEALTH_PORT", None::<&str>),
            ],
            || {
                let config =
                    HealthServerConfig::from_env_with_port_key("RAG_WORKER_HEALTH_PORT").unwrap();
                assert_eq!(config.port, 9000);
            },
        );
    }

    #[test]
    fn test_invalid_port_names_the_variable() {
        temp_env::with_vars(
            [
                ("HEALTH_PORT", None::<&str>),
                ("RAG_WORKER_HEALTH_PORT", Some("99999")),
            ],
            || {
                let err = HealthServerConfig::from_env_with_port_key("RAG_WORKER_HEALTH_PORT")
                    .unwrap_err();
                assert!(err.to_string().contains("RAG_WORKER_HEALTH_PORT"));
            },
        );
    }
}
