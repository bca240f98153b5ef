//! Access gate in front of the active driver.
//!
//! Two paths reach table data:
//! - The open path needs no credentials and only reads tables that are
//!   unlocked. A locked table is refused before any query runs against it.
//! - The administrative path needs a valid access token and ignores lock
//!   state. Changing lock state also needs the Administrator role.
//!
//! Reserved metadata tables are never served through either path; users are
//! managed through [`AuthService`] instead.

use crate::Result;
use crate::auth::AuthService;
use crate::drivers::DataDriver;
use crate::error::AcsysError;
use crate::models::{FieldDescriptor, LockState, Record, TableDescriptor, User, is_reserved_table};
use crate::query::{PageOptions, PageResult, QueryOptions};
use std::sync::Arc;

/// Enforces lock state and token checks for every data operation.
#[derive(Clone)]
pub struct AccessGate {
    driver: Arc<dyn DataDriver>,
    auth: Arc<AuthService>,
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("backend", &self.driver.database_type())
            .finish_non_exhaustive()
    }
}

impl AccessGate {
    pub fn new(driver: Arc<dyn DataDriver>, auth: Arc<AuthService>) -> Self {
        Self { driver, auth }
    }

    /// Fails with `TableLocked` unless the table is unlocked.
    pub async fn require_open(&self, table: &str) -> Result<()> {
        if self.driver.check_open_table(table).await? {
            Ok(())
        } else {
            tracing::debug!("Refused open read of locked table '{}'", table);
            Err(AcsysError::TableLocked {
                table: table.to_string(),
            })
        }
    }

    /// Reads an unlocked table without credentials.
    ///
    /// # Errors
    /// Returns `TableLocked` for locked, reserved or unknown tables.
    pub async fn read_open(&self, table: &str, options: &QueryOptions) -> Result<Vec<Record>> {
        self.require_open(table).await?;
        self.driver.get_docs(table, options).await
    }

    /// Pages through an unlocked table without credentials.
    pub async fn page_open(&self, table: &str, options: &PageOptions) -> Result<PageResult> {
        self.require_open(table).await?;
        self.driver.get_page(table, options).await
    }

    /// Reads any user table with a valid access token.
    pub async fn read(
        &self,
        token: &str,
        table: &str,
        options: &QueryOptions,
    ) -> Result<Vec<Record>> {
        self.authorize_table(token, table).await?;
        self.driver.get_docs(table, options).await
    }

    pub async fn page(&self, token: &str, table: &str, options: &PageOptions) -> Result<PageResult> {
        self.authorize_table(token, table).await?;
        self.driver.get_page(table, options).await
    }

    pub async fn insert(&self, token: &str, table: &str, record: &Record) -> Result<()> {
        self.authorize_table(token, table).await?;
        self.driver.insert_doc(table, record).await
    }

    pub async fn update(
        &self,
        token: &str,
        table: &str,
        options: &QueryOptions,
        changes: &Record,
    ) -> Result<u64> {
        self.authorize_table(token, table).await?;
        self.driver.update_docs(table, options, changes).await
    }

    pub async fn delete(&self, token: &str, table: &str, options: &QueryOptions) -> Result<u64> {
        self.authorize_table(token, table).await?;
        self.driver.delete_docs(table, options).await
    }

    /// Every user table with its lock state and size.
    pub async fn list_tables(&self, token: &str) -> Result<Vec<TableDescriptor>> {
        self.auth.authorize(token).await?;
        let mut tables = self.driver.list_tables().await?;
        tables.retain(|table| !is_reserved_table(&table.name));
        Ok(tables)
    }

    pub async fn table_size(&self, token: &str, table: &str) -> Result<u64> {
        self.authorize_table(token, table).await?;
        self.driver.get_table_size(table).await
    }

    pub async fn describe(&self, token: &str, table: &str) -> Result<Vec<FieldDescriptor>> {
        self.authorize_table(token, table).await?;
        self.driver.describe_table(table).await
    }

    /// Locks or unlocks a table. Requires the Administrator role.
    ///
    /// # Errors
    /// - `Authentication` for a bad token
    /// - `InsufficientPrivileges` for non-administrators
    /// - `InvalidQuery` for reserved or unknown tables
    pub async fn set_table_lock(&self, token: &str, table: &str, state: LockState) -> Result<()> {
        let admin = self.auth.authorize_admin(token).await?;
        self.driver.set_table_lock(table, state).await?;
        tracing::info!("User {} set '{}' to {:?}", admin.id, table, state);
        Ok(())
    }

    async fn authorize_table(&self, token: &str, table: &str) -> Result<User> {
        let user = self.auth.authorize(token).await?;
        if is_reserved_table(table) {
            tracing::warn!("User {} addressed reserved table '{}'", user.id, table);
            return Err(AcsysError::invalid_query(format!(
                "Table '{}' is reserved",
                table
            )));
        }
        Ok(user)
    }
}
