//! MySQL table introspection and the dialect used to render queries.
//!
//! MySQL columns are statically typed and comparisons between a string and a
//! number would coerce, so kind guards are decided from the column's declared
//! type before the statement is rendered.

use crate::Result;
use crate::error::AcsysError;
use crate::models::{FieldDescriptor, FieldKind};
use crate::query::ValueKind;
use crate::query::sql::{KindGuard, SqlDialect};
use sqlx::{MySqlPool, Row};

/// Columns of one table in the connected schema.
#[derive(Debug, Clone)]
pub struct MySqlTable {
    pub name: String,
    pub columns: Vec<FieldDescriptor>,
}

impl MySqlTable {
    /// Loads the column list of `table` from `INFORMATION_SCHEMA`.
    ///
    /// # Errors
    /// Returns `InvalidQuery` if the table does not exist.
    pub async fn load(pool: &MySqlPool, table: &str) -> Result<Self> {
        // Cast to CHAR to avoid VARBINARY type issues in MySQL 8.0+
        let columns_query = r#"
            SELECT
                CAST(c.COLUMN_NAME AS CHAR) as COLUMN_NAME,
                CAST(c.DATA_TYPE AS CHAR) as DATA_TYPE,
                CAST(c.COLUMN_TYPE AS CHAR) as COLUMN_TYPE,
                CAST(c.COLUMN_KEY AS CHAR) as COLUMN_KEY,
                c.ORDINAL_POSITION
            FROM INFORMATION_SCHEMA.COLUMNS c
            WHERE c.TABLE_SCHEMA = DATABASE()
            AND c.TABLE_NAME = ?
            ORDER BY c.ORDINAL_POSITION
        "#;

        let rows = sqlx::query(columns_query)
            .bind(table)
            .fetch_all(pool)
            .await
            .map_err(|e| {
                AcsysError::query_failed(format!("Failed to describe table '{}'", table), e)
            })?;

        if rows.is_empty() {
            return Err(AcsysError::invalid_query(format!(
                "Table '{}' does not exist",
                table
            )));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("COLUMN_NAME").map_err(|e| {
                AcsysError::query_failed(format!("Failed to describe table '{}'", table), e)
            })?;
            let data_type: String = row.try_get("DATA_TYPE").unwrap_or_default();
            let column_type: String = row.try_get("COLUMN_TYPE").unwrap_or_default();
            let column_key: String = row.try_get("COLUMN_KEY").unwrap_or_default();
            let ordinal_position: u32 = row
                .try_get::<u32, _>("ORDINAL_POSITION")
                .or_else(|_| {
                    row.try_get::<u64, _>("ORDINAL_POSITION")
                        .map(|p| u32::try_from(p).unwrap_or(u32::MAX))
                })
                .unwrap_or(0);

            columns.push(FieldDescriptor {
                kind: map_mysql_type(&data_type, &column_type),
                name,
                declared_type: column_type,
                is_primary_key: column_key == "PRI",
                ordinal_position,
            });
        }

        Ok(Self {
            name: table.to_string(),
            columns,
        })
    }

    fn column_kind(&self, column: &str) -> Option<FieldKind> {
        self.columns.iter().find(|c| c.name == column).map(|c| c.kind)
    }
}

impl SqlDialect for MySqlTable {
    fn quote_identifier(&self, ident: &str) -> String {
        quote_identifier(ident)
    }

    fn has_column(&self, column: &str) -> bool {
        self.column_kind(column).is_some()
    }

    fn kind_guard(&self, column: &str, _quoted: &str, kind: ValueKind) -> KindGuard {
        let Some(column_kind) = self.column_kind(column) else {
            return KindGuard::Never;
        };

        let compatible = match kind {
            ValueKind::Number | ValueKind::Boolean => matches!(
                column_kind,
                FieldKind::Integer | FieldKind::Float | FieldKind::Boolean
            ),
            // Temporal values are read back as text, so they compare as text.
            ValueKind::Text => matches!(column_kind, FieldKind::Text | FieldKind::Temporal),
            ValueKind::Null => true,
        };

        if compatible {
            KindGuard::Always
        } else {
            KindGuard::Never
        }
    }

    fn tie_break(&self) -> Vec<String> {
        let keyed: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| quote_identifier(&c.name))
            .collect();

        if keyed.is_empty() {
            self.columns.iter().map(|c| quote_identifier(&c.name)).collect()
        } else {
            keyed
        }
    }
}

/// Quotes an identifier with backticks, doubling embedded backticks.
pub fn quote_identifier(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Maps a MySQL data type to a coarse field kind.
///
/// `column_type` is the full declaration (`tinyint(1)`, `int unsigned`).
pub fn map_mysql_type(data_type: &str, column_type: &str) -> FieldKind {
    let data_type = data_type.to_lowercase();
    let column_type = column_type.to_lowercase();

    if column_type.starts_with("tinyint(1)") || data_type == "bool" || data_type == "boolean" {
        return FieldKind::Boolean;
    }

    match data_type.as_str() {
        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum" | "set" => {
            FieldKind::Text
        }
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" | "bit" => {
            FieldKind::Integer
        }
        "float" | "double" | "real" | "decimal" | "numeric" => FieldKind::Float,
        "date" | "datetime" | "timestamp" | "time" => FieldKind::Temporal,
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
            FieldKind::Binary
        }
        "json" => FieldKind::Document,
        _ => FieldKind::Other,
    }
}
