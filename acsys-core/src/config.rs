//! Application configuration.
//!
//! One JSON document describes the database, the file storage and the
//! authentication settings. Accessors on [`AppConfig`] are the only way the
//! rest of the crate reads it.
//!
//! ```json
//! {
//!   "project_name": "acsys",
//!   "database": { "type": "sqlite", "url": "sqlite://acsys.db" },
//!   "storage": { "type": "local", "root": "files", "base_url": "http://localhost:8080" },
//!   "auth": { "secret": "change-me-change-me-change-me-change-me" }
//! }
//! ```

use crate::Result;
use crate::error::AcsysError;
use crate::models::{DatabaseType, StorageType};
use crate::security::{Argon2Settings, MAX_LINK_TTL_SECS, MAX_SESSION_TTL_HOURS, SigningSecret};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Database section
#[derive(Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(rename = "type")]
    pub database_type: DatabaseType,
    pub url: String,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("database_type", &self.database_type)
            .field("url", &crate::error::redact_database_url(&self.url))
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .finish()
    }
}

impl DatabaseSettings {
    /// Applies pool overrides on top of a driver's parsed configuration.
    pub fn tune(
        &self,
        mut config: crate::drivers::ConnectionConfig,
    ) -> crate::drivers::ConnectionConfig {
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.query_timeout_secs {
            config.query_timeout = Duration::from_secs(secs);
        }
        config
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("files")
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_link_ttl_secs() -> u64 {
    3600
}

/// Storage section
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(rename = "type", default = "default_storage_type")]
    pub storage_type: StorageType,
    /// Directory served by local storage
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Public base URL of the server, used to build file links
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bucket name for cloud storage
    #[serde(default)]
    pub bucket: Option<String>,
    /// Serve local files without a signed link
    #[serde(default)]
    pub public_files: bool,
    /// Lifetime of signed file links
    #[serde(default = "default_link_ttl_secs")]
    pub link_ttl_secs: u64,
}

fn default_storage_type() -> StorageType {
    StorageType::Local
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Local,
            root: default_storage_root(),
            base_url: default_base_url(),
            bucket: None,
            public_files: false,
            link_ttl_secs: default_link_ttl_secs(),
        }
    }
}

fn default_access_ttl_hours() -> i64 {
    24
}

fn default_refresh_ttl_hours() -> i64 {
    72
}

/// Authentication section
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// May be left out of the file and supplied through `ACSYS_SECRET`
    #[serde(default = "empty_secret")]
    pub secret: SigningSecret,
    #[serde(default = "default_access_ttl_hours")]
    pub access_ttl_hours: i64,
    #[serde(default = "default_refresh_ttl_hours")]
    pub refresh_ttl_hours: i64,
    #[serde(default)]
    pub argon2: Argon2Settings,
}

impl AuthSettings {
    /// Settings with default lifetimes and the given secret.
    pub fn with_secret(secret: SigningSecret) -> Self {
        Self {
            secret,
            access_ttl_hours: default_access_ttl_hours(),
            refresh_ttl_hours: default_refresh_ttl_hours(),
            argon2: Argon2Settings::default(),
        }
    }
}

fn empty_secret() -> SigningSecret {
    SigningSecret::new(Vec::new())
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self::with_secret(empty_secret())
    }
}

fn default_project_name() -> String {
    "acsys".to_string()
}

/// Complete application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

impl AppConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self> {
        let config = Self::parse(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses without validating, so overrides can be applied first.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| AcsysError::serialization("Malformed configuration", e))
    }

    /// Reads a configuration file, applies environment overrides and
    /// validates the result.
    pub fn load(
        path: &Path,
        database_url: Option<String>,
        secret: Option<SigningSecret>,
    ) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AcsysError::io(format!("Failed to read configuration {}", path.display()), e)
        })?;

        let mut config = Self::parse(&text)?;
        if let Some(url) = database_url {
            config = config.with_database_url(url);
        }
        if let Some(secret) = secret {
            config = config.with_secret(secret);
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the database URL (for `DATABASE_URL`).
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database.url = url.into();
        self
    }

    /// Overrides the signing secret (for `ACSYS_SECRET`).
    pub fn with_secret(mut self, secret: SigningSecret) -> Self {
        self.auth.secret = secret;
        self
    }

    /// Rejects unusable settings.
    ///
    /// # Errors
    /// Returns `Configuration` for empty URLs, short secrets, out-of-range
    /// lifetimes, invalid Argon2 costs and cloud storage without a bucket.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(AcsysError::configuration("database.url cannot be empty"));
        }

        if self.database.max_connections == Some(0) {
            return Err(AcsysError::configuration(
                "database.max_connections must be greater than 0",
            ));
        }

        if self.database.connect_timeout_secs == Some(0) || self.database.query_timeout_secs == Some(0) {
            return Err(AcsysError::configuration("database timeouts must be greater than 0"));
        }

        self.auth.secret.validate()?;

        if self.auth.access_ttl_hours <= 0 || self.auth.refresh_ttl_hours <= 0 {
            return Err(AcsysError::configuration("token lifetimes must be greater than 0"));
        }
        if self.auth.access_ttl_hours > MAX_SESSION_TTL_HOURS
            || self.auth.refresh_ttl_hours > MAX_SESSION_TTL_HOURS
        {
            return Err(AcsysError::configuration(format!(
                "token lifetimes cannot exceed {} hours",
                MAX_SESSION_TTL_HOURS
            )));
        }

        self.auth.argon2.params()?;

        if self.storage.link_ttl_secs == 0 {
            return Err(AcsysError::configuration(
                "storage.link_ttl_secs must be greater than 0",
            ));
        }
        if i64::try_from(self.storage.link_ttl_secs).map_or(true, |secs| secs > MAX_LINK_TTL_SECS) {
            return Err(AcsysError::configuration(format!(
                "storage.link_ttl_secs cannot exceed {}",
                MAX_LINK_TTL_SECS
            )));
        }

        if self.storage.storage_type == StorageType::Gcp
            && self.storage.bucket.as_deref().is_none_or(str::is_empty)
        {
            return Err(AcsysError::configuration(
                "storage.bucket is required for gcp storage",
            ));
        }

        Ok(())
    }

    pub fn database_type(&self) -> DatabaseType {
        self.database.database_type
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage.storage_type
    }

    pub fn secret(&self) -> &SigningSecret {
        &self.auth.secret
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }
}
