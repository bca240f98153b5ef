//! MySQL connection pool management and validation.
//!
//! # Security Features
//! - Validates connection string format and parameters
//! - Enforces connection limits to prevent resource exhaustion
//! - Sets a server-side statement timeout on every pooled connection

use super::{ConnectionConfig, MySqlDriver};
use crate::Result;
use crate::error::{AcsysError, redact_database_url};
use sqlx::MySqlPool;
use url::Url;

/// MySQL default port.
pub const MYSQL_DEFAULT_PORT: u16 = 3306;

impl MySqlDriver {
    /// Creates a new MySQL driver with connection pooling.
    ///
    /// The pool connects lazily; [`crate::drivers::DataDriver::initialize`]
    /// is the first call that reaches the server.
    ///
    /// # Errors
    /// Returns error if the connection string or pool configuration is invalid
    pub async fn new(connection_string: &str) -> Result<Self> {
        let config = parse_mysql_connection_config(connection_string)?;
        Self::with_config(connection_string, config).await
    }

    /// Creates a new MySQL driver with custom configuration.
    pub async fn with_config(connection_string: &str, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        validate_mysql_connection_string(connection_string)?;

        let pool = create_mysql_connection_pool(connection_string, &config)?;

        Ok(Self {
            pool,
            config,
            connection_url: connection_string.to_string(),
        })
    }

    /// Closes the connection pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// True if the pool can acquire a working connection.
    pub async fn is_pool_healthy(&self) -> bool {
        match sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
        {
            Ok(result) => result == 1,
            Err(_) => false,
        }
    }

    /// Connection URL with the password masked.
    pub fn redacted_url(&self) -> String {
        redact_database_url(&self.connection_url)
    }
}

/// Parses MySQL connection string to extract configuration parameters.
pub fn parse_mysql_connection_config(connection_string: &str) -> Result<ConnectionConfig> {
    validate_mysql_connection_string(connection_string)?;

    let config = ConnectionConfig::from_url(connection_string, Some(MYSQL_DEFAULT_PORT))?;

    if let Some(database) = &config.database
        && database.len() > 64
    {
        return Err(AcsysError::configuration(
            "Database name too long: maximum 64 characters",
        ));
    }

    if let Some(username) = &config.username
        && username.len() > 32
    {
        return Err(AcsysError::configuration(
            "Username too long: maximum 32 characters for MySQL",
        ));
    }

    Ok(config)
}

/// Validates MySQL connection string format.
///
/// # Errors
/// Returns error if connection string is invalid
pub fn validate_mysql_connection_string(connection_string: &str) -> Result<()> {
    let url = Url::parse(connection_string).map_err(|_| {
        AcsysError::configuration(format!(
            "Invalid MySQL connection string format: {}",
            redact_database_url(connection_string)
        ))
    })?;

    if url.scheme() != "mysql" {
        return Err(AcsysError::configuration(
            "Connection string must use mysql:// scheme",
        ));
    }

    if url.host_str().is_none() {
        return Err(AcsysError::configuration(
            "Connection string must specify a host",
        ));
    }

    Ok(())
}

/// Creates a MySQL connection pool.
///
/// Every connection gets a statement timeout and a UTC session time zone.
fn create_mysql_connection_pool(
    connection_string: &str,
    config: &ConnectionConfig,
) -> Result<MySqlPool> {
    use sqlx::Executor;

    let query_timeout_ms = config.query_timeout.as_millis();

    sqlx::mysql::MySqlPoolOptions::new()
        .max_connections(config.max_connections.min(100))
        .min_connections(config.min_idle_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .test_before_acquire(true)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET max_execution_time = {}", query_timeout_ms).as_str())
                    .await?;
                conn.execute("SET time_zone = '+00:00'").await?;
                Ok(())
            })
        })
        .connect_lazy(connection_string)
        .map_err(|e| {
            AcsysError::query_failed(
                format!(
                    "Failed to create MySQL connection pool to {}",
                    redact_database_url(connection_string)
                ),
                e,
            )
        })
}
