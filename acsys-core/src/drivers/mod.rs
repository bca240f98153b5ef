//! Driver contract and factory for interchangeable storage backends.
//!
//! Every backend implements [`DataDriver`]; the rest of the crate only ever
//! holds an `Arc<dyn DataDriver>` chosen once at startup from configuration.
//!
//! # Module Structure
//! - `config`: Connection configuration (`ConnectionConfig`)
//! - `helpers`: Name validation shared by all drivers
//! - Backend modules (`sqlite`, `mysql`, `mongodb`), each behind its feature

use crate::Result;
use crate::error::AcsysError;
use crate::models::{
    DatabaseType, FieldDescriptor, LockState, OPEN_TABLES_TABLE, Record, TableDescriptor, USERS_TABLE,
    User, is_reserved_table,
};
use crate::query::{Operator, PageOptions, PageResult, QueryOptions};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

pub mod config;
pub mod helpers;

pub use config::ConnectionConfig;

/// Column holding the table name in the open-tables metadata table.
pub const OPEN_TABLE_NAME_FIELD: &str = "table_name";

/// Backend driver with object-safe design.
///
/// # Security Guarantees
/// - Every value reaches the backend as a bound parameter
/// - Credentials are never stored in `connection_config` or logged
/// - Reserved metadata tables can never be unlocked
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Arc<dyn DataDriver>`.
#[async_trait]
pub trait DataDriver: Send + Sync {
    /// Verifies connectivity and provisions the reserved metadata tables.
    ///
    /// Safe to call more than once.
    ///
    /// # Errors
    /// Returns `Connection` if the backend is unreachable.
    async fn initialize(&self) -> Result<()>;

    /// Liveness probe. Never errors.
    async fn is_connected(&self) -> bool;

    /// Returns the records matching `options`.
    ///
    /// Without `order` the backend's natural order is kept; with `order`
    /// rows are sorted by `order.field` and then by the table's stable
    /// identifier.
    async fn get_docs(&self, table: &str, options: &QueryOptions) -> Result<Vec<Record>>;

    /// Returns one page of the matching records plus cursors.
    ///
    /// Pages are always ordered by the stable identifier, so the same cursor
    /// yields the same slice on an unmodified table.
    async fn get_page(&self, table: &str, options: &PageOptions) -> Result<PageResult>;

    /// Raw table or collection names, excluding engine-internal tables.
    async fn table_names(&self) -> Result<Vec<String>>;

    /// Exact number of records in a table.
    async fn get_table_size(&self, table: &str) -> Result<u64>;

    /// Column or field introspection.
    async fn describe_table(&self, table: &str) -> Result<Vec<FieldDescriptor>>;

    /// Inserts one record.
    async fn insert_doc(&self, table: &str, record: &Record) -> Result<()>;

    /// Sets `changes` on every record matching `options`; returns the count.
    async fn update_docs(&self, table: &str, options: &QueryOptions, changes: &Record) -> Result<u64>;

    /// Deletes every record matching `options`; returns the count.
    async fn delete_docs(&self, table: &str, options: &QueryOptions) -> Result<u64>;

    /// Returns the database type this driver handles.
    fn database_type(&self) -> DatabaseType;

    /// Gets the connection configuration (credentials sanitized).
    fn connection_config(&self) -> ConnectionConfig;

    /// Names of all unlocked tables.
    async fn open_tables(&self) -> Result<HashSet<String>> {
        let rows = self.get_docs(OPEN_TABLES_TABLE, &QueryOptions::all()).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row.get(OPEN_TABLE_NAME_FIELD) {
                Some(serde_json::Value::String(name)) => Some(name.clone()),
                _ => None,
            })
            .filter(|name| !is_reserved_table(name))
            .collect())
    }

    /// All tables with their lock state and exact size.
    async fn list_tables(&self) -> Result<Vec<TableDescriptor>> {
        let open = self.open_tables().await?;
        let mut tables = Vec::new();

        for name in self.table_names().await? {
            let row_count = self.get_table_size(&name).await?;
            let lock_state = if open.contains(&name) {
                LockState::Unlocked
            } else {
                LockState::Locked
            };
            tables.push(TableDescriptor {
                name,
                lock_state,
                row_count,
                backend: self.database_type(),
            });
        }

        Ok(tables)
    }

    /// True iff the table is unlocked.
    ///
    /// Reserved metadata tables always report `false`.
    async fn check_open_table(&self, table: &str) -> Result<bool> {
        if is_reserved_table(table) {
            return Ok(false);
        }

        let options = QueryOptions::all()
            .with_filter(OPEN_TABLE_NAME_FIELD, Operator::Eq, table)
            .with_limit(1);
        Ok(!self.get_docs(OPEN_TABLES_TABLE, &options).await?.is_empty())
    }

    /// Moves a table between `Locked` and `Unlocked`. Idempotent.
    ///
    /// # Errors
    /// Returns `InvalidQuery` when unlocking a reserved table or naming a
    /// table that does not exist.
    async fn set_table_lock(&self, table: &str, state: LockState) -> Result<()> {
        helpers::validate_table_name(table)?;

        if is_reserved_table(table) {
            return match state {
                LockState::Locked => Ok(()),
                LockState::Unlocked => Err(AcsysError::invalid_query(format!(
                    "Reserved table '{}' cannot be unlocked",
                    table
                ))),
            };
        }

        let filter = QueryOptions::all().with_filter(OPEN_TABLE_NAME_FIELD, Operator::Eq, table);

        match state {
            LockState::Locked => {
                self.delete_docs(OPEN_TABLES_TABLE, &filter).await?;
            }
            LockState::Unlocked => {
                if !self.table_names().await?.iter().any(|name| name == table) {
                    return Err(AcsysError::invalid_query(format!(
                        "Table '{}' does not exist",
                        table
                    )));
                }
                if self.check_open_table(table).await? {
                    return Ok(());
                }

                let mut record = Record::new();
                record.insert(
                    OPEN_TABLE_NAME_FIELD.to_string(),
                    serde_json::Value::String(table.to_string()),
                );
                if let Err(e) = self.insert_doc(OPEN_TABLES_TABLE, &record).await {
                    // A concurrent unlock may have inserted the same row.
                    if !self.check_open_table(table).await? {
                        return Err(e);
                    }
                }
            }
        }

        tracing::info!("Table '{}' is now {:?}", table, state);
        Ok(())
    }

    /// Stored password hash of a user.
    ///
    /// # Errors
    /// Returns `NotFound` if no user has the id.
    async fn verify_password(&self, user_id: &str) -> Result<String> {
        let options = QueryOptions::all()
            .with_filter("acsys_id", Operator::Eq, user_id)
            .with_limit(1);

        let record = self
            .get_docs(USERS_TABLE, &options)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AcsysError::not_found("user"))?;

        match record.get("acsys_cd") {
            Some(serde_json::Value::String(hash)) => Ok(hash.clone()),
            _ => Err(AcsysError::not_found("user password hash")),
        }
    }

    /// Users matching `options`.
    async fn get_users(&self, options: &QueryOptions) -> Result<Vec<User>> {
        self.get_docs(USERS_TABLE, options)
            .await?
            .into_iter()
            .map(User::from_record)
            .collect()
    }
}

/// Creates the driver selected by configuration.
///
/// The driver is connected but not yet initialized; callers run
/// [`DataDriver::initialize`] once before serving requests.
///
/// # Security
/// - Connection strings are redacted in every error
///
/// # Errors
/// Returns error if:
/// - The URL does not match the configured backend
/// - The backend's feature is not compiled in
/// - The connection cannot be set up
pub async fn create_driver(settings: &crate::config::DatabaseSettings) -> Result<Arc<dyn DataDriver>> {
    let detected = detect_database_type(&settings.url)?;
    if detected != settings.database_type {
        return Err(AcsysError::configuration(format!(
            "database.url is a {} URL but database.type is {}",
            detected, settings.database_type
        )));
    }

    match settings.database_type {
        #[cfg(feature = "sqlite")]
        DatabaseType::Sqlite => {
            let config = settings.tune(sqlite::parse_sqlite_connection_config(&settings.url)?);
            let driver = sqlite::SqliteDriver::with_config(&settings.url, config).await?;
            Ok(Arc::new(driver))
        }
        #[cfg(not(feature = "sqlite"))]
        DatabaseType::Sqlite => Err(AcsysError::unsupported_feature(
            "SQLite driver",
            "Compile with --features sqlite to enable SQLite support",
        )),
        #[cfg(feature = "mysql")]
        DatabaseType::MySql => {
            let config = settings.tune(mysql::parse_mysql_connection_config(&settings.url)?);
            let driver = mysql::MySqlDriver::with_config(&settings.url, config).await?;
            Ok(Arc::new(driver))
        }
        #[cfg(not(feature = "mysql"))]
        DatabaseType::MySql => Err(AcsysError::unsupported_feature(
            "MySQL driver",
            "Compile with --features mysql to enable MySQL support",
        )),
        #[cfg(feature = "mongodb")]
        DatabaseType::MongoDb => {
            let config = settings.tune(mongodb::parse_mongodb_connection_config(&settings.url)?);
            let driver = mongodb::MongoDriver::with_config(&settings.url, config).await?;
            Ok(Arc::new(driver))
        }
        #[cfg(not(feature = "mongodb"))]
        DatabaseType::MongoDb => Err(AcsysError::unsupported_feature(
            "MongoDB driver",
            "Compile with --features mongodb to enable MongoDB support",
        )),
    }
}

/// Detects the backend from a connection string.
///
/// # Errors
/// Returns error if connection string format is unrecognized
pub fn detect_database_type(connection_string: &str) -> Result<DatabaseType> {
    if connection_string.starts_with("mysql://") {
        Ok(DatabaseType::MySql)
    } else if connection_string.starts_with("sqlite:")
        || connection_string == ":memory:"
        || connection_string.ends_with(".db")
        || connection_string.ends_with(".sqlite")
        || connection_string.ends_with(".sqlite3")
    {
        Ok(DatabaseType::Sqlite)
    } else if connection_string.starts_with("mongodb://")
        || connection_string.starts_with("mongodb+srv://")
    {
        Ok(DatabaseType::MongoDb)
    } else {
        Err(AcsysError::configuration(
            "Unrecognized database connection string format",
        ))
    }
}

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "mongodb")]
pub mod mongodb;
