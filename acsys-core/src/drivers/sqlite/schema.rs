//! SQLite table introspection and the dialect used to render queries.
//!
//! SQLite is dynamically typed, so kind guards test `typeof()` of the
//! stored value rather than the declared column type.
//!
//! # SQLite Type Affinity Rules
//! 1. Contains "INT" -> INTEGER affinity
//! 2. Contains "CHAR", "CLOB", or "TEXT" -> TEXT affinity
//! 3. Contains "BLOB" or no type specified -> BLOB affinity
//! 4. Contains "REAL", "FLOA", or "DOUB" -> REAL affinity
//! 5. Otherwise -> NUMERIC affinity

use crate::Result;
use crate::error::AcsysError;
use crate::models::{FieldDescriptor, FieldKind};
use crate::query::ValueKind;
use crate::query::sql::{KindGuard, SqlDialect};
use sqlx::{Row, SqlitePool};

/// Columns of one table, as reported by `PRAGMA table_info`.
#[derive(Debug, Clone)]
pub struct SqliteTable {
    pub name: String,
    pub columns: Vec<FieldDescriptor>,
    /// Primary-key columns in key order
    pub primary_key: Vec<String>,
}

impl SqliteTable {
    /// Loads the column list of `table`.
    ///
    /// # Errors
    /// Returns `InvalidQuery` if the table does not exist.
    pub async fn load(pool: &SqlitePool, table: &str) -> Result<Self> {
        let pragma = format!("PRAGMA table_info({})", quote_identifier(table));

        let rows = sqlx::query(&pragma).fetch_all(pool).await.map_err(|e| {
            AcsysError::query_failed(format!("Failed to describe table '{}'", table), e)
        })?;

        if rows.is_empty() {
            return Err(AcsysError::invalid_query(format!(
                "Table '{}' does not exist",
                table
            )));
        }

        let mut columns = Vec::with_capacity(rows.len());
        let mut keyed: Vec<(i64, String)> = Vec::new();

        for row in &rows {
            let cid: i64 = row.try_get("cid").unwrap_or(0);
            let name: String = row.try_get("name").unwrap_or_default();
            let declared_type: String = row.try_get("type").unwrap_or_default();
            let pk: i64 = row.try_get("pk").unwrap_or(0);

            if pk > 0 {
                keyed.push((pk, name.clone()));
            }

            columns.push(FieldDescriptor {
                kind: map_sqlite_type(&declared_type),
                name,
                declared_type,
                is_primary_key: pk > 0,
                ordinal_position: u32::try_from(cid.saturating_add(1)).unwrap_or(u32::MAX),
            });
        }

        keyed.sort_by_key(|(position, _)| *position);

        Ok(Self {
            name: table.to_string(),
            columns,
            primary_key: keyed.into_iter().map(|(_, name)| name).collect(),
        })
    }
}

impl SqlDialect for SqliteTable {
    fn quote_identifier(&self, ident: &str) -> String {
        quote_identifier(ident)
    }

    fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }

    fn kind_guard(&self, _column: &str, quoted: &str, kind: ValueKind) -> KindGuard {
        match kind {
            ValueKind::Number | ValueKind::Boolean => {
                KindGuard::Expr(format!("typeof({}) IN ('integer', 'real')", quoted))
            }
            ValueKind::Text => KindGuard::Expr(format!("typeof({}) = 'text'", quoted)),
            ValueKind::Null => KindGuard::Always,
        }
    }

    fn tie_break(&self) -> Vec<String> {
        if self.primary_key.is_empty() {
            vec!["rowid".to_string()]
        } else {
            self.primary_key.iter().map(|c| quote_identifier(c)).collect()
        }
    }
}

/// Quotes an identifier with double quotes, doubling embedded quotes.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Maps a declared SQLite column type to a coarse field kind.
pub fn map_sqlite_type(sqlite_type: &str) -> FieldKind {
    let type_upper = sqlite_type.to_uppercase();
    let type_str = type_upper.trim();

    if type_str.is_empty() {
        return FieldKind::Binary;
    }
    if type_str.contains("BOOL") {
        return FieldKind::Boolean;
    }
    if type_str.contains("DATE") || type_str.contains("TIME") {
        return FieldKind::Temporal;
    }
    if type_str.contains("INT") {
        return FieldKind::Integer;
    }
    if type_str.contains("CHAR") || type_str.contains("CLOB") || type_str.contains("TEXT") {
        return FieldKind::Text;
    }
    if type_str.contains("BLOB") {
        return FieldKind::Binary;
    }
    if type_str.contains("REAL") || type_str.contains("FLOA") || type_str.contains("DOUB") {
        return FieldKind::Float;
    }
    if type_str.contains("JSON") {
        return FieldKind::Document;
    }
    FieldKind::Other
}
