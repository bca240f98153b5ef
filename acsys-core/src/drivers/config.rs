//! Driver connection configuration.
//!
//! This module provides the `ConnectionConfig` struct describing how a
//! driver reaches its backend, with pool and timeout settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Configuration for a driver connection.
///
/// # Security
/// This struct intentionally does NOT store passwords or credentials.
/// The full connection URL stays private to the driver that owns it.
///
/// # Example
/// ```rust
/// use acsys_core::drivers::ConnectionConfig;
///
/// let config = ConnectionConfig::new("localhost".to_string())
///     .with_port(3306)
///     .with_database("acsys".to_string())
///     .with_username("admin".to_string());
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host address
    pub host: String,
    /// Optional port number
    pub port: Option<u16>,
    /// Optional database name
    pub database: Option<String>,
    /// Optional username (password handled separately)
    pub username: Option<String>,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Query timeout duration
    pub query_timeout: Duration,
    /// Maximum number of connections in pool
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_idle_connections: u32,
    /// How long an idle connection is kept
    pub idle_timeout: Option<Duration>,
    /// Maximum lifetime of one connection
    pub max_lifetime: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            database: None,
            username: None,
            connect_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(30),
            max_connections: 10,
            min_idle_connections: 0,
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(3600)),
        }
    }
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ConnectionConfig({}{}{})",
            self.host,
            self.port.map_or_else(String::new, |p| format!(":{}", p)),
            self.database
                .as_ref()
                .map_or_else(String::new, |db| format!("/{}", db))
        )
        // Intentionally omit username and never include credentials
    }
}

impl ConnectionConfig {
    /// Validates connection configuration parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> crate::Result<()> {
        if self.host.is_empty() {
            return Err(crate::error::AcsysError::configuration(
                "host cannot be empty",
            ));
        }

        if self.port == Some(0) {
            return Err(crate::error::AcsysError::configuration(
                "port must be greater than 0",
            ));
        }

        if self.max_connections == 0 {
            return Err(crate::error::AcsysError::configuration(
                "max_connections must be greater than 0",
            ));
        }

        if self.max_connections > 100 {
            return Err(crate::error::AcsysError::configuration(
                "max_connections should not exceed 100 for safety",
            ));
        }

        if self.min_idle_connections > self.max_connections {
            return Err(crate::error::AcsysError::configuration(
                "min_idle_connections cannot exceed max_connections",
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(crate::error::AcsysError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(crate::error::AcsysError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Creates a new connection config with safe defaults.
    pub fn new(host: String) -> Self {
        Self {
            host,
            ..Default::default()
        }
    }

    /// Derives host, port, database and username from a connection URL.
    ///
    /// `default_port` fills the port when the URL omits it.
    pub fn from_url(connection_string: &str, default_port: Option<u16>) -> crate::Result<Self> {
        let url = Url::parse(connection_string).map_err(|_| {
            crate::error::AcsysError::configuration(format!(
                "Invalid connection string: {}",
                crate::error::redact_database_url(connection_string)
            ))
        })?;

        let mut config = Self::new(url.host_str().unwrap_or("localhost").to_string());
        config.port = url.port().or(default_port);

        let database = url.path().trim_start_matches('/');
        if !database.is_empty() {
            config = config.with_database(database.to_string());
        }

        if !url.username().is_empty() {
            config = config.with_username(url.username().to_string());
        }

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "connect_timeout" | "connectTimeoutMS" => {
                    if let Ok(raw) = value.parse::<u64>()
                        && raw > 0
                    {
                        config.connect_timeout = if key == "connectTimeoutMS" {
                            Duration::from_millis(raw)
                        } else {
                            Duration::from_secs(raw)
                        };
                    }
                }
                "pool_max_conns" | "maxPoolSize" => {
                    if let Ok(max_conns) = value.parse::<u32>()
                        && max_conns > 0
                        && max_conns <= 100
                    {
                        config.max_connections = max_conns;
                    }
                }
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Builder method to set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Builder method to set database.
    pub fn with_database(mut self, database: String) -> Self {
        self.database = Some(database);
        self
    }

    /// Builder method to set username.
    pub fn with_username(mut self, username: String) -> Self {
        self.username = Some(username);
        self
    }

    /// Builder method to set pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Builder method to set both timeouts.
    pub fn with_timeouts(mut self, connect: Duration, query: Duration) -> Self {
        self.connect_timeout = connect;
        self.query_timeout = query;
        self
    }
}
