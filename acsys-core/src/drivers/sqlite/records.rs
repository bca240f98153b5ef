//! Conversion between SQLite rows and records, and parameter binding.

use crate::models::Record;
use crate::query::QueryValue;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Binds values in order.
pub fn bind_values<'q>(mut query: SqliteQuery<'q>, binds: &[QueryValue]) -> SqliteQuery<'q> {
    for value in binds {
        query = match value {
            QueryValue::Bool(b) => query.bind(i64::from(*b)),
            QueryValue::Integer(i) => query.bind(*i),
            QueryValue::Float(f) => query.bind(*f),
            QueryValue::Text(s) => query.bind(s.clone()),
            QueryValue::Null => query.bind(None::<String>),
        };
    }
    query
}

/// Converts a row to a record.
pub fn row_to_record(row: &SqliteRow) -> Record {
    let mut record = Record::new();
    for column in row.columns() {
        let column_name = column.name();
        record.insert(column_name.to_string(), extract_column_value(row, column_name));
    }
    record
}

/// Extract a column value as a JSON value.
fn extract_column_value(row: &SqliteRow, column_name: &str) -> JsonValue {
    // SQLite is dynamically typed, so we need to try multiple types
    if let Ok(v) = row.try_get::<Option<String>, _>(column_name) {
        return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(column_name) {
        return v
            .map(|n| JsonValue::Number(n.into()))
            .unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(column_name) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(column_name) {
        return v
            .map(|bytes| {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                JsonValue::String(format!("base64:{}", encoded))
            })
            .unwrap_or(JsonValue::Null);
    }

    JsonValue::Null
}
