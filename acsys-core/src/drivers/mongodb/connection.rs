//! MongoDB connection management.
//!
//! # Security Features
//! - Connection string credentials are never logged
//! - Timeout configuration for all operations

use super::{ConnectionConfig, MongoDriver};
use crate::Result;
use crate::error::{AcsysError, redact_database_url};
use mongodb::Client;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use std::time::Duration;
use url::Url;

/// MongoDB default port.
pub const MONGODB_DEFAULT_PORT: u16 = 27017;

/// Database used when the connection string names none.
pub const DEFAULT_DATABASE: &str = "acsys";

impl MongoDriver {
    /// Creates a new MongoDB driver from a connection string.
    ///
    /// No server is contacted until the first operation.
    ///
    /// # Errors
    /// Returns error if the connection string or its options are invalid
    pub async fn new(connection_string: &str) -> Result<Self> {
        let config = parse_mongodb_connection_config(connection_string)?;
        Self::with_config(connection_string, config).await
    }

    /// Creates a new MongoDB driver with custom configuration.
    pub async fn with_config(connection_string: &str, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        validate_mongodb_connection_string(connection_string)?;

        let client_options = create_client_options(connection_string, &config).await?;
        let client = Client::with_options(client_options).map_err(|e| {
            AcsysError::query_failed(
                format!(
                    "Failed to create MongoDB client for {}",
                    redact_database_url(connection_string)
                ),
                e,
            )
        })?;

        let database = config
            .database
            .clone()
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        Ok(Self {
            client,
            database,
            config,
        })
    }

    /// Runs `ping` against the configured database.
    pub async fn ping(&self) -> Result<()> {
        self.database()
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(AcsysError::connection_failed)?;
        Ok(())
    }

    /// Gets the MongoDB client reference.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Name of the database holding every collection.
    pub fn database_name(&self) -> &str {
        &self.database
    }
}

/// Parses a MongoDB connection string to extract configuration.
pub fn parse_mongodb_connection_config(connection_string: &str) -> Result<ConnectionConfig> {
    validate_mongodb_connection_string(connection_string)?;

    // SRV records supply their own ports.
    let default_port = if connection_string.starts_with("mongodb+srv://") {
        None
    } else {
        Some(MONGODB_DEFAULT_PORT)
    };
    let mut config = ConnectionConfig::from_url(connection_string, default_port)?;

    let url = Url::parse(connection_string).map_err(|_| {
        AcsysError::configuration("Invalid MongoDB connection string format")
    })?;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "serverSelectionTimeoutMS" => {
                if let Ok(timeout_ms) = value.parse::<u64>()
                    && timeout_ms > 0
                    && timeout_ms <= 300_000
                {
                    config.query_timeout = Duration::from_millis(timeout_ms);
                }
            }
            "minPoolSize" => {
                if let Ok(min_pool) = value.parse::<u32>()
                    && min_pool <= config.max_connections
                {
                    config.min_idle_connections = min_pool;
                }
            }
            _ => {}
        }
    }

    config.validate()?;
    Ok(config)
}

/// Validates a MongoDB connection string.
///
/// # Errors
/// Returns error if connection string is invalid
pub fn validate_mongodb_connection_string(connection_string: &str) -> Result<()> {
    let url = Url::parse(connection_string).map_err(|_| {
        AcsysError::configuration(format!(
            "Invalid MongoDB connection string format: {}",
            redact_database_url(connection_string)
        ))
    })?;

    if !matches!(url.scheme(), "mongodb" | "mongodb+srv") {
        return Err(AcsysError::configuration(
            "Connection string must use mongodb:// or mongodb+srv:// scheme",
        ));
    }

    if url.host_str().is_none() {
        return Err(AcsysError::configuration(
            "Connection string must specify a host",
        ));
    }

    Ok(())
}

async fn create_client_options(
    connection_string: &str,
    config: &ConnectionConfig,
) -> Result<ClientOptions> {
    let mut options = ClientOptions::parse(connection_string).await.map_err(|_| {
        AcsysError::configuration(format!(
            "Failed to parse MongoDB connection options for {}",
            redact_database_url(connection_string)
        ))
    })?;

    options.connect_timeout = Some(config.connect_timeout);
    options.server_selection_timeout = Some(config.query_timeout);
    options.max_pool_size = Some(config.max_connections);
    options.min_pool_size = Some(config.min_idle_connections);
    if let Some(idle_timeout) = config.idle_timeout {
        options.max_idle_time = Some(idle_timeout);
    }
    options.app_name = Some(format!("acsys-{}", env!("CARGO_PKG_VERSION")));

    Ok(options)
}
