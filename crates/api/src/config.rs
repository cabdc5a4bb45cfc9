//! Application configuration loaded from environment variables.

use std::time::Duration;

use thiserror::Error;

/// Which services this process hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    /// Both services in one process.
    All,
    Sales,
    Stock,
}

impl ServiceRole {
    pub fn hosts_sales(&self) -> bool {
        matches!(self, ServiceRole::All | ServiceRole::Sales)
    }

    pub fn hosts_stock(&self) -> bool {
        matches!(self, ServiceRole::All | ServiceRole::Stock)
    }
}

impl std::str::FromStr for ServiceRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(ServiceRole::All),
            "sales" => Ok(ServiceRole::Sales),
            "stock" => Ok(ServiceRole::Stock),
            _ => Err(ConfigError::Invalid {
                key: "SERVICE_ROLE",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("{key} is required when SERVICE_ROLE is {role}")]
    Missing { key: &'static str, role: &'static str },
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `SERVICE_ROLE` — `all`, `sales` or `stock` (default: `all`)
/// - `SALES_DATABASE_URL`, `STOCK_DATABASE_URL`, `BROKER_DATABASE_URL` —
///   PostgreSQL databases; in-memory stores when unset
/// - `STOCK_SERVICE_URL` — stock service base URL for the sales role
///   (default: `"http://localhost:8080"`)
/// - `STOCK_CLIENT_TIMEOUT_MS` — stock request timeout (default: `5000`)
/// - `OUTBOX_POLL_INTERVAL_MS` — relay poll interval (default: `500`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub role: ServiceRole,
    pub sales_database_url: Option<String>,
    pub stock_database_url: Option<String>,
    pub broker_database_url: Option<String>,
    pub stock_service_url: String,
    pub stock_client_timeout: Duration,
    pub outbox_poll_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let millis = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                None => Ok(default),
                Some(value) => value
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| ConfigError::Invalid { key, value }),
            }
        };

        let config = Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: match lookup("PORT") {
                None => defaults.port,
                Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                    key: "PORT",
                    value,
                })?,
            },
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            role: match lookup("SERVICE_ROLE") {
                None => defaults.role,
                Some(value) => value.parse()?,
            },
            sales_database_url: lookup("SALES_DATABASE_URL"),
            stock_database_url: lookup("STOCK_DATABASE_URL"),
            broker_database_url: lookup("BROKER_DATABASE_URL"),
            stock_service_url: lookup("STOCK_SERVICE_URL").unwrap_or(defaults.stock_service_url),
            stock_client_timeout: millis("STOCK_CLIENT_TIMEOUT_MS", defaults.stock_client_timeout)?,
            outbox_poll_interval: millis("OUTBOX_POLL_INTERVAL_MS", defaults.outbox_poll_interval)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// A split deployment needs durable stores and a shared broker.
    fn validate(&self) -> Result<(), ConfigError> {
        let role = match self.role {
            ServiceRole::All => return Ok(()),
            ServiceRole::Sales => "sales",
            ServiceRole::Stock => "stock",
        };
        if self.broker_database_url.is_none() {
            return Err(ConfigError::Missing {
                key: "BROKER_DATABASE_URL",
                role,
            });
        }
        if self.role == ServiceRole::Sales && self.sales_database_url.is_none() {
            return Err(ConfigError::Missing {
                key: "SALES_DATABASE_URL",
                role,
            });
        }
        if self.role == ServiceRole::Stock && self.stock_database_url.is_none() {
            return Err(ConfigError::Missing {
                key: "STOCK_DATABASE_URL",
                role,
            });
        }
        Ok(())
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when every store this process needs is configured to be durable.
    pub fn is_persistent(&self) -> bool {
        self.broker_database_url.is_some()
            && (!self.role.hosts_sales() || self.sales_database_url.is_some())
            && (!self.role.hosts_stock() || self.stock_database_url.is_some())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            role: ServiceRole::All,
            sales_database_url: None,
            stock_database_url: None,
            broker_database_url: None,
            stock_service_url: "http://localhost:8080".to_string(),
            stock_client_timeout: Duration::from_millis(5000),
            outbox_poll_interval: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.role, ServiceRole::All);
        assert!(!config.is_persistent());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.stock_client_timeout, Duration::from_secs(5));
        assert_eq!(config.outbox_poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_reads_overrides() {
        let config = load(&[
            ("PORT", "8081"),
            ("SERVICE_ROLE", "Sales"),
            ("SALES_DATABASE_URL", "postgres://sales"),
            ("BROKER_DATABASE_URL", "postgres://broker"),
            ("STOCK_SERVICE_URL", "http://stock:8080"),
            ("STOCK_CLIENT_TIMEOUT_MS", "250"),
        ])
        .unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.role, ServiceRole::Sales);
        assert_eq!(config.stock_service_url, "http://stock:8080");
        assert_eq!(config.stock_client_timeout, Duration::from_millis(250));
        assert!(config.is_persistent());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert_eq!(
            load(&[("PORT", "http")]).unwrap_err(),
            ConfigError::Invalid {
                key: "PORT",
                value: "http".to_string()
            }
        );
        assert!(load(&[("SERVICE_ROLE", "billing")]).is_err());
        assert!(load(&[("OUTBOX_POLL_INTERVAL_MS", "-1")]).is_err());
    }

    #[test]
    fn test_split_roles_need_databases() {
        assert_eq!(
            load(&[("SERVICE_ROLE", "stock")]).unwrap_err(),
            ConfigError::Missing {
                key: "BROKER_DATABASE_URL",
                role: "stock"
            }
        );
        assert!(
            load(&[
                ("SERVICE_ROLE", "stock"),
                ("BROKER_DATABASE_URL", "postgres://broker")
            ])
            .is_err()
        );
    }
}
