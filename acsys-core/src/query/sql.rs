//! Parameterized SQL rendering shared by the relational drivers.
//!
//! Each driver describes its engine through [`SqlDialect`] (identifier
//! quoting, the table's columns, how to test a column's stored kind, and the
//! stable identifier used to break ties). The functions here never look at
//! which engine they are rendering for.
//!
//! Filters are joined with `AND`; every value is bound as a parameter.

use super::{Filter, Operator, QueryOptions, QueryValue, SortDirection, ValueKind};
use crate::Result;
use crate::error::AcsysError;
use crate::models::Record;

/// Whether a column can hold values of a given kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindGuard {
    /// Column kind always matches
    Always,
    /// Column kind never matches
    Never,
    /// Matches where the SQL predicate holds
    Expr(String),
}

/// Engine-specific facts the renderer needs about one table.
pub trait SqlDialect {
    /// Quotes an identifier, escaping embedded quote characters.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Whether the table has the column.
    fn has_column(&self, column: &str) -> bool;

    /// Predicate testing that `column` currently stores a value of `kind`.
    ///
    /// `quoted` is the already quoted column expression.
    fn kind_guard(&self, column: &str, quoted: &str, kind: ValueKind) -> KindGuard;

    /// Expressions forming a unique, stable ordering of the table's rows.
    fn tie_break(&self) -> Vec<String>;
}

/// A rendered statement and its bind parameters, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub binds: Vec<QueryValue>,
}

/// Renders the `WHERE` body for a filter list.
///
/// An empty list renders `1 = 1`.
pub fn render_where(dialect: &dyn SqlDialect, filters: &[Filter]) -> Result<(String, Vec<QueryValue>)> {
    let mut predicates = Vec::with_capacity(filters.len());
    let mut binds = Vec::new();

    for filter in filters {
        filter.validate()?;
        predicates.push(render_predicate(dialect, filter, &mut binds));
    }

    if predicates.is_empty() {
        return Ok(("1 = 1".to_string(), binds));
    }
    Ok((predicates.join(" AND "), binds))
}

fn render_predicate(dialect: &dyn SqlDialect, filter: &Filter, binds: &mut Vec<QueryValue>) -> String {
    let field = filter.field();
    if !dialect.has_column(field) {
        return "1 = 0".to_string();
    }

    let column = dialect.quote_identifier(field);
    let value = filter.value();

    if matches!(value, QueryValue::Null) {
        return match filter.operator() {
            Operator::Ne => format!("{} IS NOT NULL", column),
            _ => format!("{} IS NULL", column),
        };
    }

    let guard = dialect.kind_guard(field, &column, value.kind());

    match filter.operator() {
        Operator::Ne => match guard {
            KindGuard::Never => "1 = 1".to_string(),
            KindGuard::Always => {
                binds.push(bindable(value));
                format!("({} IS NULL OR {} <> ?)", column, column)
            }
            KindGuard::Expr(expr) => {
                binds.push(bindable(value));
                format!("({} IS NULL OR NOT ({}) OR {} <> ?)", column, expr, column)
            }
        },
        op => match guard {
            KindGuard::Never => "1 = 0".to_string(),
            KindGuard::Always => {
                binds.push(bindable(value));
                format!("{} {} ?", column, op.as_str())
            }
            KindGuard::Expr(expr) => {
                binds.push(bindable(value));
                format!("({} AND {} {} ?)", expr, column, op.as_str())
            }
        },
    }
}

/// Booleans are stored as integers by relational engines.
fn bindable(value: &QueryValue) -> QueryValue {
    match value {
        QueryValue::Bool(b) => QueryValue::Integer(i64::from(*b)),
        other => other.clone(),
    }
}

/// Renders `ORDER BY` for an optional ordering plus the dialect's tie-break.
///
/// Returns an empty string when neither applies.
pub fn render_order_by(
    dialect: &dyn SqlDialect,
    order: Option<&super::OrderBy>,
    with_tie_break: bool,
) -> String {
    let mut terms = Vec::new();

    if let Some(order) = order
        && dialect.has_column(&order.field)
    {
        let direction = match order.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        terms.push(format!("{} {}", dialect.quote_identifier(&order.field), direction));
    }

    if with_tie_break || order.is_some() {
        for expr in dialect.tie_break() {
            let term = format!("{} ASC", expr);
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
    }

    if terms.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", terms.join(", "))
    }
}

/// Renders a `SELECT *` honouring filters, ordering and limit.
///
/// With `offset`, rows are always ordered by the tie-break so that pages are
/// reproducible.
pub fn render_select(
    dialect: &dyn SqlDialect,
    table: &str,
    options: &QueryOptions,
    offset: Option<u64>,
) -> Result<SqlStatement> {
    options.validate()?;
    let (where_clause, mut binds) = render_where(dialect, &options.filters)?;
    let order_by = render_order_by(dialect, options.order.as_ref(), offset.is_some());

    let mut sql = format!(
        "SELECT * FROM {} WHERE {}{}",
        dialect.quote_identifier(table),
        where_clause,
        order_by
    );

    if let Some(limit) = options.limit {
        sql.push_str(" LIMIT ?");
        binds.push(QueryValue::Integer(i64::from(limit)));
        if let Some(offset) = offset {
            sql.push_str(" OFFSET ?");
            binds.push(QueryValue::Integer(i64::try_from(offset).map_err(|_| {
                AcsysError::invalid_query("Page offset out of range")
            })?));
        }
    }

    Ok(SqlStatement { sql, binds })
}

/// Renders `SELECT COUNT(*)` over the filtered table.
pub fn render_count(dialect: &dyn SqlDialect, table: &str, filters: &[Filter]) -> Result<SqlStatement> {
    let (where_clause, binds) = render_where(dialect, filters)?;
    Ok(SqlStatement {
        sql: format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            dialect.quote_identifier(table),
            where_clause
        ),
        binds,
    })
}

/// Renders an `INSERT` of one record.
///
/// # Errors
/// Returns `InvalidQuery` if the record is empty or names an unknown column.
pub fn render_insert(dialect: &dyn SqlDialect, table: &str, record: &Record) -> Result<SqlStatement> {
    if record.is_empty() {
        return Err(AcsysError::invalid_query("Cannot insert an empty record"));
    }

    let mut columns = Vec::with_capacity(record.len());
    let mut binds = Vec::with_capacity(record.len());
    for (field, value) in record {
        require_column(dialect, table, field)?;
        columns.push(dialect.quote_identifier(field));
        binds.push(bindable(&QueryValue::for_storage(value)));
    }

    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(SqlStatement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.quote_identifier(table),
            columns.join(", "),
            placeholders
        ),
        binds,
    })
}

/// Renders an `UPDATE` setting `changes` on every filtered row.
pub fn render_update(
    dialect: &dyn SqlDialect,
    table: &str,
    filters: &[Filter],
    changes: &Record,
) -> Result<SqlStatement> {
    if changes.is_empty() {
        return Err(AcsysError::invalid_query("Update has no changes"));
    }

    let mut assignments = Vec::with_capacity(changes.len());
    let mut binds = Vec::with_capacity(changes.len());
    for (field, value) in changes {
        require_column(dialect, table, field)?;
        assignments.push(format!("{} = ?", dialect.quote_identifier(field)));
        binds.push(bindable(&QueryValue::for_storage(value)));
    }

    let (where_clause, where_binds) = render_where(dialect, filters)?;
    binds.extend(where_binds);

    Ok(SqlStatement {
        sql: format!(
            "UPDATE {} SET {} WHERE {}",
            dialect.quote_identifier(table),
            assignments.join(", "),
            where_clause
        ),
        binds,
    })
}

/// Renders a `DELETE` of every filtered row.
pub fn render_delete(dialect: &dyn SqlDialect, table: &str, filters: &[Filter]) -> Result<SqlStatement> {
    let (where_clause, binds) = render_where(dialect, filters)?;
    Ok(SqlStatement {
        sql: format!(
            "DELETE FROM {} WHERE {}",
            dialect.quote_identifier(table),
            where_clause
        ),
        binds,
    })
}

fn require_column(dialect: &dyn SqlDialect, table: &str, column: &str) -> Result<()> {
    if dialect.has_column(column) {
        Ok(())
    } else {
        Err(AcsysError::invalid_query(format!(
            "Table '{}' has no column '{}'",
            table, column
        )))
    }
}
