//! MongoDB driver: the document-store backend.
//!
//! # Module Structure
//! - `connection`: Client management and connection-string parsing
//! - `convert`: BSON to record conversion and back
//! - `schema`: Field inference from document samples
//!
//! # Document Semantics
//! - Every filter requires its field to exist, so filters on missing fields
//!   never match
//! - Identifiers are exposed as hex strings and accepted back as such
//! - Pages are sorted by the requested field and then by `_id`
//! - Collections are created out of band, except the reserved metadata
//!   collections which `initialize` provisions with their unique indexes

mod connection;
pub mod convert;
pub mod schema;


use super::helpers::{validate_options_fields, validate_record_fields, validate_table_name};
use super::{ConnectionConfig, DataDriver, OPEN_TABLE_NAME_FIELD};
use crate::Result;
use crate::error::AcsysError;
use crate::models::{DatabaseType, FieldDescriptor, OPEN_TABLES_TABLE, Record, USERS_TABLE};
use crate::query::document::{filter_document, sort_document};
use crate::query::{PageOptions, PageResult, QueryOptions};
use async_trait::async_trait;
use mongodb::bson::{Document, doc};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use schema::{DESCRIBE_SAMPLE_SIZE, FieldInferrer};

pub use connection::{
    DEFAULT_DATABASE, parse_mongodb_connection_config, validate_mongodb_connection_string,
};

/// MongoDB driver.
pub struct MongoDriver {
    /// MongoDB client
    pub client: Client,
    /// Database holding every collection
    database: String,
    /// Connection configuration
    pub config: ConnectionConfig,
}

impl std::fmt::Debug for MongoDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDriver")
            .field("database", &self.database)
            .field("config", &self.config)
            // Note: the connection string is never stored
            .finish_non_exhaustive()
    }
}

impl MongoDriver {
    fn database(&self) -> Database {
        self.client.database(&self.database)
    }

    fn raw_collection(&self, table: &str) -> Collection<Document> {
        self.database().collection::<Document>(table)
    }

    /// Collection handle for an existing collection.
    ///
    /// # Errors
    /// Returns `InvalidQuery` for malformed names and missing collections.
    async fn collection(&self, table: &str) -> Result<Collection<Document>> {
        validate_table_name(table)?;

        let names = self
            .database()
            .list_collection_names()
            .filter(doc! { "name": table })
            .await
            .map_err(|e| AcsysError::query_failed("Failed to list collections", e))?;

        if names.is_empty() {
            return Err(AcsysError::invalid_query(format!(
                "Table '{}' does not exist",
                table
            )));
        }

        Ok(self.raw_collection(table))
    }

    async fn find_records(
        &self,
        table: &str,
        collection: &Collection<Document>,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Record>> {
        let mut cursor = collection
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| AcsysError::query_failed(format!("Failed to read table '{}'", table), e))?;

        let mut records = Vec::new();
        while cursor.advance().await.map_err(|e| {
            AcsysError::query_failed(format!("Failed to iterate cursor for '{}'", table), e)
        })? {
            let doc = cursor.deserialize_current().map_err(|e| {
                AcsysError::query_failed(format!("Failed to deserialize document from '{}'", table), e)
            })?;
            records.push(convert::document_to_record(doc));
        }
        Ok(records)
    }

    async fn ensure_unique_index(&self, table: &str, field: &str) -> Result<()> {
        let mut keys = Document::new();
        keys.insert(field, 1);

        let index = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.raw_collection(table)
            .create_index(index)
            .await
            .map_err(|e| AcsysError::query_failed("Failed to provision metadata tables", e))?;
        Ok(())
    }
}

#[async_trait]
impl DataDriver for MongoDriver {
    async fn initialize(&self) -> Result<()> {
        self.ping().await?;

        // Creating an index also creates its collection.
        self.ensure_unique_index(USERS_TABLE, "username").await?;
        self.ensure_unique_index(USERS_TABLE, "acsys_id").await?;
        self.ensure_unique_index(OPEN_TABLES_TABLE, OPEN_TABLE_NAME_FIELD).await?;

        tracing::info!(
            "MongoDB driver ready ({}, database {})",
            self.config,
            self.database
        );
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.ping().await.is_ok()
    }

    async fn get_docs(&self, table: &str, options: &QueryOptions) -> Result<Vec<Record>> {
        options.validate()?;
        validate_options_fields(options)?;
        let collection = self.collection(table).await?;

        let filter = filter_document(&options.filters)?;
        let mut find_options = FindOptions::default();
        if options.order.is_some() {
            find_options.sort = Some(sort_document(options.order.as_ref()));
        }
        find_options.limit = options.limit.map(i64::from);

        tracing::debug!(
            "Reading '{}' with {} filter(s)",
            table,
            options.filters.len()
        );
        self.find_records(table, &collection, filter, find_options).await
    }

    async fn get_page(&self, table: &str, options: &PageOptions) -> Result<PageResult> {
        options.validate()?;
        let query = options.query();
        validate_options_fields(&query)?;

        let collection = self.collection(table).await?;
        let offset = options.offset()?;

        let filter = filter_document(&query.filters)?;
        let mut find_options = FindOptions::default();
        find_options.sort = Some(sort_document(query.order.as_ref()));
        find_options.skip = Some(offset);
        find_options.limit = Some(i64::from(options.page_size()));

        tracing::debug!(
            "Reading page of '{}' at offset {} with {} filter(s)",
            table,
            offset,
            query.filters.len()
        );

        let records = self
            .find_records(table, &collection, filter.clone(), find_options)
            .await?;
        let total = collection
            .count_documents(filter)
            .await
            .map_err(|e| AcsysError::query_failed(format!("Failed to count table '{}'", table), e))?;

        options.result(records, total)
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let mut names = self
            .database()
            .list_collection_names()
            .await
            .map_err(|e| AcsysError::query_failed("Failed to list tables", e))?;
        names.retain(|name| !name.starts_with("system."));
        names.sort();
        Ok(names)
    }

    async fn get_table_size(&self, table: &str) -> Result<u64> {
        let collection = self.collection(table).await?;
        collection
            .count_documents(doc! {})
            .await
            .map_err(|e| AcsysError::query_failed(format!("Failed to count table '{}'", table), e))
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<FieldDescriptor>> {
        let collection = self.collection(table).await?;

        let mut find_options = FindOptions::default();
        find_options.limit = Some(DESCRIBE_SAMPLE_SIZE);

        let mut cursor = collection
            .find(doc! {})
            .with_options(find_options)
            .await
            .map_err(|e| {
                AcsysError::query_failed(format!("Failed to sample documents from '{}'", table), e)
            })?;

        let mut inferrer = FieldInferrer::new();
        while cursor.advance().await.map_err(|e| {
            AcsysError::query_failed(format!("Failed to iterate cursor for '{}'", table), e)
        })? {
            let doc = cursor.deserialize_current().map_err(|e| {
                AcsysError::query_failed(format!("Failed to deserialize document from '{}'", table), e)
            })?;
            inferrer.analyze_document(&doc);
        }

        Ok(inferrer.finalize())
    }

    async fn insert_doc(&self, table: &str, record: &Record) -> Result<()> {
        if record.is_empty() {
            return Err(AcsysError::invalid_query("Cannot insert an empty record"));
        }
        validate_record_fields(record)?;
        let collection = self.collection(table).await?;

        collection
            .insert_one(convert::record_to_document(record))
            .await
            .map_err(|e| AcsysError::query_failed(format!("Failed to write table '{}'", table), e))?;
        Ok(())
    }

    async fn update_docs(&self, table: &str, options: &QueryOptions, changes: &Record) -> Result<u64> {
        if changes.is_empty() {
            return Err(AcsysError::invalid_query("Update has no changes"));
        }
        validate_options_fields(options)?;
        validate_record_fields(changes)?;
        let collection = self.collection(table).await?;

        let filter = filter_document(&options.filters)?;
        let update = doc! { "$set": convert::record_to_document(changes) };

        let result = collection
            .update_many(filter, update)
            .await
            .map_err(|e| AcsysError::query_failed(format!("Failed to write table '{}'", table), e))?;
        Ok(result.matched_count)
    }

    async fn delete_docs(&self, table: &str, options: &QueryOptions) -> Result<u64> {
        validate_options_fields(options)?;
        let collection = self.collection(table).await?;

        let filter = filter_document(&options.filters)?;
        let result = collection
            .delete_many(filter)
            .await
            .map_err(|e| AcsysError::query_failed(format!("Failed to write table '{}'", table), e))?;
        Ok(result.deleted_count)
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MongoDb
    }

    fn connection_config(&self) -> ConnectionConfig {
        self.config.clone()
    }
}
