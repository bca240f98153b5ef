//! Process-wide wiring of configuration, driver, storage and auth.
//!
//! Exactly one driver is chosen at startup; every other component shares it
//! through an `Arc`.

use crate::Result;
use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::drivers::{DataDriver, create_driver};
use crate::error::AcsysError;
use crate::gate::AccessGate;
use crate::models::{DatabaseType, StorageType};
use crate::security::TokenIssuer;
use crate::storage::{StorageDriver, create_storage};
use std::sync::Arc;

/// Everything a request handler needs.
#[derive(Clone)]
pub struct AppContext {
    config: Arc<AppConfig>,
    driver: Arc<dyn DataDriver>,
    storage: Arc<dyn StorageDriver>,
    auth: Arc<AuthService>,
    gate: AccessGate,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("project", &self.config.project_name)
            .field("database", &self.database_type())
            .field("storage", &self.storage_type())
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Validates configuration, connects the configured backend and
    /// provisions its metadata tables.
    ///
    /// # Errors
    /// - `Configuration` for invalid settings
    /// - `Connection` if the backend is unreachable
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let driver = create_driver(&config.database).await?;
        driver.initialize().await?;
        tracing::info!(
            "Project '{}' using {} with {} storage",
            config.project_name,
            config.database_type(),
            config.storage_type()
        );

        Self::with_driver(config, driver).await
    }

    /// Wires the components around an already initialized driver.
    pub async fn with_driver(config: AppConfig, driver: Arc<dyn DataDriver>) -> Result<Self> {
        let tokens = TokenIssuer::new(
            config.secret(),
            hours(config.auth.access_ttl_hours, "auth.access_ttl_hours")?,
            hours(config.auth.refresh_ttl_hours, "auth.refresh_ttl_hours")?,
        )?;

        let storage = create_storage(&config.storage, tokens.clone())?;
        let auth = Arc::new(AuthService::new(Arc::clone(&driver), tokens, &config.auth.argon2).await?);
        let gate = AccessGate::new(Arc::clone(&driver), Arc::clone(&auth));

        Ok(Self {
            config: Arc::new(config),
            driver,
            storage,
            auth,
            gate,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn driver(&self) -> &Arc<dyn DataDriver> {
        &self.driver
    }

    pub fn storage(&self) -> &Arc<dyn StorageDriver> {
        &self.storage
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn database_type(&self) -> DatabaseType {
        self.driver.database_type()
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage.storage_type()
    }
}

fn hours(value: i64, key: &str) -> Result<chrono::Duration> {
    chrono::Duration::try_hours(value)
        .filter(|duration| *duration > chrono::Duration::zero())
        .ok_or_else(|| AcsysError::configuration(format!("{} is out of range", key)))
}
