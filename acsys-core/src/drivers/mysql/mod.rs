//! MySQL driver with connection pooling.
//!
//! # Module Structure
//! - `connection`: Connection pool management and validation
//! - `schema`: `INFORMATION_SCHEMA` introspection and the query dialect
//! - `records`: Row to record conversion and parameter binding
//!
//! # Security Guarantees
//! - Every value is a bound parameter
//! - Connection strings are sanitized in error messages
//! - Statement timeouts prevent resource exhaustion

pub mod connection;
pub mod records;
pub mod schema;


use super::helpers::{count_to_u64, validate_options_fields, validate_record_fields, validate_table_name};
use super::{ConnectionConfig, DataDriver};
use crate::Result;
use crate::error::AcsysError;
use crate::models::{DatabaseType, FieldDescriptor, Record};
use crate::query::sql::{
    SqlStatement, render_count, render_delete, render_insert, render_select, render_update,
};
use crate::query::{PageOptions, PageResult, QueryOptions};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row};

pub use connection::{parse_mysql_connection_config, validate_mysql_connection_string};
pub use schema::{MySqlTable, map_mysql_type};

/// DDL for the reserved metadata tables.
const PROVISION_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS `acsys_users` (
        `acsys_id` VARCHAR(64) NOT NULL PRIMARY KEY,
        `username` VARCHAR(255) NOT NULL UNIQUE,
        `email` VARCHAR(255) NOT NULL DEFAULT '',
        `role` VARCHAR(64) NOT NULL,
        `mode` VARCHAR(64) NOT NULL DEFAULT '',
        `acsys_cd` VARCHAR(255) NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS `acsys_open_tables` (
        `table_name` VARCHAR(128) NOT NULL PRIMARY KEY
    )",
];

/// MySQL driver with connection pooling.
pub struct MySqlDriver {
    /// Connection pool for database operations
    pub pool: MySqlPool,
    /// Connection configuration (pool settings, timeouts, etc.)
    pub config: ConnectionConfig,
    /// Original connection URL, kept private to prevent credential exposure
    connection_url: String,
}

impl std::fmt::Debug for MySqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlDriver")
            .field("config", &self.config)
            .field("pool_size", &self.pool.size())
            .field("pool_idle", &self.pool.num_idle())
            // Note: connection_url is intentionally omitted to prevent credential exposure
            .finish_non_exhaustive()
    }
}

impl MySqlDriver {
    async fn table(&self, table: &str) -> Result<MySqlTable> {
        validate_table_name(table)?;
        MySqlTable::load(&self.pool, table).await
    }

    async fn fetch_records(&self, table: &str, statement: &SqlStatement) -> Result<Vec<Record>> {
        let rows = records::bind_values(sqlx::query(&statement.sql), &statement.binds)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AcsysError::query_failed(format!("Failed to read table '{}'", table), e))?;

        Ok(rows.iter().map(records::row_to_record).collect())
    }

    async fn fetch_count(&self, table: &str, statement: &SqlStatement) -> Result<u64> {
        let row = records::bind_values(sqlx::query(&statement.sql), &statement.binds)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AcsysError::query_failed(format!("Failed to count table '{}'", table), e))?;

        let count: i64 = row
            .try_get(0)
            .map_err(|e| AcsysError::query_failed(format!("Failed to count table '{}'", table), e))?;
        Ok(count_to_u64(count))
    }

    async fn execute(&self, table: &str, statement: &SqlStatement) -> Result<u64> {
        let result = records::bind_values(sqlx::query(&statement.sql), &statement.binds)
            .execute(&self.pool)
            .await
            .map_err(|e| AcsysError::query_failed(format!("Failed to write table '{}'", table), e))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DataDriver for MySqlDriver {
    async fn initialize(&self) -> Result<()> {
        let connectivity_result: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(AcsysError::connection_failed)?;

        if connectivity_result != 1 {
            return Err(AcsysError::configuration(
                "Basic connectivity test failed: unexpected result",
            ));
        }

        if self.config.database.is_none() {
            return Err(AcsysError::configuration(
                "MySQL connection string must name a database",
            ));
        }

        for statement in PROVISION_STATEMENTS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AcsysError::query_failed("Failed to provision metadata tables", e))?;
        }

        tracing::info!("MySQL driver ready ({})", self.config);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.is_pool_healthy().await
    }

    async fn get_docs(&self, table: &str, options: &QueryOptions) -> Result<Vec<Record>> {
        validate_options_fields(options)?;
        let schema = self.table(table).await?;
        let statement = render_select(&schema, table, options, None)?;

        tracing::debug!(
            "Reading '{}' with {} filter(s)",
            table,
            options.filters.len()
        );
        self.fetch_records(table, &statement).await
    }

    async fn get_page(&self, table: &str, options: &PageOptions) -> Result<PageResult> {
        options.validate()?;
        let query = options.query().with_limit(options.page_size());
        validate_options_fields(&query)?;

        let schema = self.table(table).await?;
        let offset = options.offset()?;

        let select = render_select(&schema, table, &query, Some(offset))?;
        let count = render_count(&schema, table, &query.filters)?;

        tracing::debug!(
            "Reading page of '{}' at offset {} with {} filter(s)",
            table,
            offset,
            query.filters.len()
        );

        let records = self.fetch_records(table, &select).await?;
        let total = self.fetch_count(table, &count).await?;
        options.result(records, total)
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT CAST(TABLE_NAME AS CHAR) FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
             ORDER BY TABLE_NAME",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AcsysError::query_failed("Failed to list tables", e))
    }

    async fn get_table_size(&self, table: &str) -> Result<u64> {
        let schema = self.table(table).await?;
        let statement = render_count(&schema, table, &[])?;
        self.fetch_count(table, &statement).await
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<FieldDescriptor>> {
        Ok(self.table(table).await?.columns)
    }

    async fn insert_doc(&self, table: &str, record: &Record) -> Result<()> {
        validate_record_fields(record)?;
        let schema = self.table(table).await?;
        let statement = render_insert(&schema, table, record)?;
        self.execute(table, &statement).await?;
        Ok(())
    }

    async fn update_docs(&self, table: &str, options: &QueryOptions, changes: &Record) -> Result<u64> {
        validate_options_fields(options)?;
        validate_record_fields(changes)?;
        let schema = self.table(table).await?;
        let statement = render_update(&schema, table, &options.filters, changes)?;
        self.execute(table, &statement).await
    }

    async fn delete_docs(&self, table: &str, options: &QueryOptions) -> Result<u64> {
        validate_options_fields(options)?;
        let schema = self.table(table).await?;
        let statement = render_delete(&schema, table, &options.filters)?;
        self.execute(table, &statement).await
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySql
    }

    fn connection_config(&self) -> ConnectionConfig {
        self.config.clone()
    }
}
