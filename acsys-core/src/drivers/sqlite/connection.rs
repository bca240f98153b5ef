//! SQLite connection handling.
//!
//! # Connection Modes
//! - File-based: `sqlite:///path/to/database.db` or `sqlite://./relative.db`
//! - In-memory: `sqlite::memory:` or `:memory:`
//!
//! File databases are created on first use. An in-memory database lives
//! only as long as its connection, so it is pinned to one connection that
//! is never recycled.

use super::{ConnectionConfig, SqliteDriver};
use crate::Result;
use crate::error::AcsysError;
use sqlx::SqlitePool;
use url::Url;

impl SqliteDriver {
    /// Creates a new SQLite driver from a connection string.
    ///
    /// # Connection String Formats
    /// - `sqlite:///path/to/database.db` - Absolute file path
    /// - `sqlite://./relative/path.db` - Relative file path
    /// - `sqlite::memory:` or `:memory:` - In-memory database
    ///
    /// # Errors
    /// Returns error if:
    /// - Connection string format is invalid
    /// - Database cannot be opened or created
    pub async fn new(connection_string: &str) -> Result<Self> {
        let config = parse_sqlite_connection_config(connection_string)?;
        Self::with_config(connection_string, config).await
    }

    /// Creates a new SQLite driver with custom configuration.
    pub async fn with_config(connection_string: &str, mut config: ConnectionConfig) -> Result<Self> {
        if is_in_memory(connection_string) {
            pin_single_connection(&mut config);
        }
        config.validate()?;
        validate_sqlite_connection_string(connection_string)?;
        let pool = create_sqlite_connection(connection_string, &config).await?;

        tracing::debug!("Opened SQLite database {}", config);

        Ok(Self {
            pool,
            config,
            connection_string: connection_string.to_string(),
        })
    }

    /// Checks if the connection is to an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        is_in_memory(&self.connection_string)
    }

    /// Closes the connection gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Checks if the connection is healthy.
    pub async fn is_healthy(&self) -> bool {
        match sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
        {
            Ok(result) => result == 1,
            Err(_) => false,
        }
    }
}

fn is_in_memory(connection_string: &str) -> bool {
    connection_string.contains(":memory:") || connection_string.contains("mode=memory")
}

/// Parses SQLite connection string to extract configuration parameters.
pub fn parse_sqlite_connection_config(connection_string: &str) -> Result<ConnectionConfig> {
    validate_sqlite_connection_string(connection_string)?;

    let mut config = ConnectionConfig::new("localhost".to_string())
        .with_database(extract_database_name(connection_string));

    if is_in_memory(connection_string) {
        pin_single_connection(&mut config);
    } else {
        config.max_connections = 4;
    }

    Ok(config)
}

fn pin_single_connection(config: &mut ConnectionConfig) {
    config.max_connections = 1;
    config.min_idle_connections = 1;
    config.idle_timeout = None;
    config.max_lifetime = None;
}

/// Validates SQLite connection string format.
///
/// # Errors
/// Returns error if connection string is invalid
pub fn validate_sqlite_connection_string(connection_string: &str) -> Result<()> {
    if connection_string == ":memory:" {
        return Ok(());
    }

    if connection_string.ends_with(".db")
        || connection_string.ends_with(".sqlite")
        || connection_string.ends_with(".sqlite3")
    {
        return Ok(());
    }

    if connection_string.starts_with("sqlite:") {
        if is_in_memory(connection_string) {
            return Ok(());
        }

        if let Ok(url) = Url::parse(connection_string) {
            if url.scheme() != "sqlite" {
                return Err(AcsysError::configuration(
                    "Connection string must use sqlite:// scheme",
                ));
            }
            return Ok(());
        }

        if connection_string.starts_with("sqlite://") {
            return Ok(());
        }
    }

    Err(AcsysError::configuration(
        "Invalid SQLite connection string format: expected sqlite:// URL, file path, or :memory:",
    ))
}

/// Extracts database name from connection string.
fn extract_database_name(connection_string: &str) -> String {
    if is_in_memory(connection_string) {
        return ":memory:".to_string();
    }

    let path = connection_string
        .strip_prefix("sqlite://")
        .or_else(|| connection_string.strip_prefix("sqlite:"))
        .unwrap_or(connection_string);
    let path = path.split('?').next().unwrap_or(path);

    match path.rsplit('/').next() {
        Some(filename) if !filename.is_empty() => filename.to_string(),
        _ => "main".to_string(),
    }
}

/// Creates a SQLite connection pool with proper configuration.
async fn create_sqlite_connection(
    connection_string: &str,
    config: &ConnectionConfig,
) -> Result<SqlitePool> {
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;

    let normalized = normalize_connection_string(connection_string);

    let options = SqliteConnectOptions::from_str(&normalized)
        .map_err(|e| {
            AcsysError::configuration(format!("Invalid SQLite connection string: {}", e))
        })?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(config.query_timeout);

    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .min_connections(config.min_idle_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect_with(options)
        .await
        .map_err(AcsysError::connection_failed)
}

/// Normalizes connection string to SQLite URL format.
fn normalize_connection_string(connection_string: &str) -> String {
    if connection_string == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    if connection_string.starts_with("sqlite:") {
        return connection_string.to_string();
    }

    format!("sqlite://{}", connection_string)
}
