//! Helper utilities shared by the driver implementations.

use crate::Result;
use crate::error::AcsysError;
use crate::query::QueryOptions;
use std::sync::OnceLock;

/// Longest accepted table or collection name.
pub const MAX_TABLE_NAME_LEN: usize = 128;

fn table_name_pattern() -> Option<&'static regex::Regex> {
    static PATTERN: OnceLock<Option<regex::Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").ok())
        .as_ref()
}

/// Validates a table or collection name before it reaches a backend.
///
/// Names are quoted when rendered; this check keeps them to a portable
/// character set that every backend accepts.
///
/// # Errors
/// Returns `InvalidQuery` for empty, overlong or unusual names.
pub fn validate_table_name(table: &str) -> Result<()> {
    if table.is_empty() || table.len() > MAX_TABLE_NAME_LEN {
        return Err(AcsysError::invalid_query(format!(
            "Table name must be 1-{} characters",
            MAX_TABLE_NAME_LEN
        )));
    }

    match table_name_pattern() {
        Some(pattern) if pattern.is_match(table) => Ok(()),
        _ => Err(AcsysError::invalid_query(format!(
            "Invalid table name '{}'",
            table
        ))),
    }
}

/// Validates field names used in filters, orderings and written records.
///
/// Operator-like names (leading `$`) and embedded NULs are refused.
pub fn validate_field_name(field: &str) -> Result<()> {
    if field.is_empty() || field.starts_with('$') || field.contains('\0') {
        return Err(AcsysError::invalid_query(format!(
            "Invalid field name '{}'",
            field.escape_debug()
        )));
    }
    Ok(())
}

/// Validates every field name an options value mentions.
pub fn validate_options_fields(options: &QueryOptions) -> Result<()> {
    for filter in &options.filters {
        validate_field_name(filter.field())?;
    }
    if let Some(order) = &options.order {
        validate_field_name(&order.field)?;
    }
    Ok(())
}

/// Validates every field name of a record about to be written.
pub fn validate_record_fields(record: &crate::models::Record) -> Result<()> {
    record.keys().try_for_each(|field| validate_field_name(field))
}

/// Converts a backend count to `u64`, clamping negatives to zero.
pub fn count_to_u64(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}
