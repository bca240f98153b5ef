//! Generic query-options vocabulary and its translation to native queries.
//!
//! Every driver accepts the same [`QueryOptions`]: a conjunctive list of
//! `(field, operator, value)` filters, an optional limit and an optional
//! ordering. Translation lives in submodules:
//! - `sql`: parameterized SQL rendering over a [`sql::SqlDialect`]
//! - `document`: BSON filter/sort documents (feature `mongodb`)
//!
//! # Comparison semantics
//! Values keep their representation: the string `"5"` and the number `5` are
//! distinct. Ordering operators and `=` only match values of the same kind;
//! `!=` matches any existing field whose value differs, including values of a
//! different kind. Filters on fields a table does not have match nothing.

pub mod sql;

#[cfg(feature = "mongodb")]
pub mod document;

use crate::Result;
use crate::error::AcsysError;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Default number of records per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Upper bound on records per page.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Comparison operator of a filter triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    /// The operator as written in query options (and in SQL, except `!=`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }
}

impl std::str::FromStr for Operator {
    type Err = AcsysError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            other => Err(AcsysError::invalid_query(format!(
                "Unsupported operator '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Operator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Kind of a filter value, used to refuse cross-kind comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    Text,
}

/// Scalar value of a filter triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl QueryValue {
    /// Kind of the value.
    pub fn kind(&self) -> ValueKind {
        match self {
            QueryValue::Bool(_) => ValueKind::Boolean,
            QueryValue::Integer(_) | QueryValue::Float(_) => ValueKind::Number,
            QueryValue::Text(_) => ValueKind::Text,
            QueryValue::Null => ValueKind::Null,
        }
    }

    /// Converts a JSON scalar. Arrays and objects have no scalar form.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(QueryValue::Null),
            serde_json::Value::Bool(b) => Some(QueryValue::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(QueryValue::Integer)
                .or_else(|| n.as_f64().map(QueryValue::Float)),
            serde_json::Value::String(s) => Some(QueryValue::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// Converts any JSON value for storage; non-scalars become JSON text.
    pub fn for_storage(value: &serde_json::Value) -> Self {
        Self::from_json(value).unwrap_or_else(|| QueryValue::Text(value.to_string()))
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Integer(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        QueryValue::Integer(i64::from(value))
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        QueryValue::Float(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Bool(value)
    }
}

/// One `(field, operator, value)` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter(pub String, pub Operator, pub QueryValue);

impl Filter {
    /// Builds a filter triple.
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<QueryValue>) -> Self {
        Self(field.into(), operator, value.into())
    }

    pub fn field(&self) -> &str {
        &self.0
    }

    pub fn operator(&self) -> Operator {
        self.1
    }

    pub fn value(&self) -> &QueryValue {
        &self.2
    }

    /// Rejects combinations no backend can evaluate.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(AcsysError::invalid_query("Filter field cannot be empty"));
        }
        if matches!(self.2, QueryValue::Null) && !matches!(self.1, Operator::Eq | Operator::Ne) {
            return Err(AcsysError::invalid_query(format!(
                "Operator '{}' cannot compare against null",
                self.1
            )));
        }
        if let QueryValue::Float(f) = self.2
            && !f.is_finite()
        {
            return Err(AcsysError::invalid_query("Filter value must be finite"));
        }
        Ok(())
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

/// `(field, direction)` ordering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, SortDirection)", into = "(String, SortDirection)")]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

impl From<(String, SortDirection)> for OrderBy {
    fn from((field, direction): (String, SortDirection)) -> Self {
        Self { field, direction }
    }
}

impl From<OrderBy> for (String, SortDirection) {
    fn from(order: OrderBy) -> Self {
        (order.field, order.direction)
    }
}

/// Generic filter/order/limit request shape.
///
/// An empty `where` matches every record of the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(rename = "where", default)]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderBy>,
}

impl QueryOptions {
    /// Options matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parses options from their JSON text form.
    ///
    /// # Errors
    /// Returns `InvalidQuery` for malformed JSON, unknown operators,
    /// non-scalar values or a zero limit.
    pub fn parse(text: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(text)
            .map_err(|e| AcsysError::invalid_query(format!("Malformed query options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Builder: adds a filter.
    pub fn with_filter(
        mut self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<QueryValue>,
    ) -> Self {
        self.filters.push(Filter::new(field, operator, value));
        self
    }

    /// Builder: sets the limit.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Builder: sets the ordering.
    pub fn with_order(mut self, order: OrderBy) -> Self {
        self.order = Some(order);
        self
    }

    /// Validates filters and limit.
    pub fn validate(&self) -> Result<()> {
        for filter in &self.filters {
            filter.validate()?;
        }
        if self.limit == Some(0) {
            return Err(AcsysError::invalid_query("limit must be a positive integer"));
        }
        if let Some(order) = &self.order
            && order.field.is_empty()
        {
            return Err(AcsysError::invalid_query("order field cannot be empty"));
        }
        Ok(())
    }
}

/// Request for one page of a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageOptions {
    #[serde(rename = "where", default)]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl PageOptions {
    /// Parses page options from their JSON text form.
    pub fn parse(text: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(text)
            .map_err(|e| AcsysError::invalid_query(format!("Malformed page options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Effective page size after defaults.
    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Decoded offset of the requested page.
    pub fn offset(&self) -> Result<u64> {
        match &self.cursor {
            Some(cursor) => Ok(PageCursor::decode(cursor)?.offset),
            None => Ok(0),
        }
    }

    /// Filter/order part of the request as query options without a limit.
    pub fn query(&self) -> QueryOptions {
        QueryOptions {
            filters: self.filters.clone(),
            limit: None,
            order: self.order.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.query().validate()?;
        let size = self.page_size();
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(AcsysError::invalid_query(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        self.offset()?;
        Ok(())
    }

    /// Builds the result for a fetched slice.
    pub fn result(&self, records: Vec<crate::models::Record>, total: u64) -> Result<PageResult> {
        let offset = self.offset()?;
        let size = u64::from(self.page_size());
        let end = offset.saturating_add(records.len() as u64);

        let next_cursor = (end < total && !records.is_empty())
            .then(|| PageCursor { offset: end }.encode());
        let previous_cursor = (offset > 0).then(|| {
            PageCursor {
                offset: offset.saturating_sub(size),
            }
            .encode()
        });

        Ok(PageResult {
            records,
            next_cursor,
            previous_cursor,
            total,
        })
    }
}

/// One bounded slice of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub records: Vec<crate::models::Record>,
    pub next_cursor: Option<String>,
    pub previous_cursor: Option<String>,
    /// Exact number of records matching the filters
    pub total: u64,
}

/// Opaque pagination marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub offset: u64,
}

impl PageCursor {
    pub fn encode(&self) -> String {
        // Serializing a struct of one integer cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(cursor: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|_| AcsysError::invalid_query("Malformed page cursor"))?;
        serde_json::from_slice(&bytes).map_err(|_| AcsysError::invalid_query("Malformed page cursor"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_options() {
        let options = QueryOptions::parse(
            r#"{"where": [["role", "=", "Administrator"], ["age", ">=", 21]], "limit": 1, "order": ["age", "desc"]}"#,
        )
        .unwrap();

        assert_eq!(options.filters.len(), 2);
        assert_eq!(options.filters[0].field(), "role");
        assert_eq!(options.filters[0].operator(), Operator::Eq);
        assert_eq!(options.filters[0].value(), &QueryValue::Text("Administrator".into()));
        assert_eq!(options.filters[1].value(), &QueryValue::Integer(21));
        assert_eq!(options.limit, Some(1));
        assert_eq!(options.order, Some(OrderBy::desc("age")));
    }

    #[test]
    fn test_parse_empty_options_matches_all() {
        let options = QueryOptions::parse("{}").unwrap();
        assert_eq!(options, QueryOptions::all());
        let options = QueryOptions::parse(r#"{"where": []}"#).unwrap();
        assert!(options.filters.is_empty());
    }

    #[test]
    fn test_unknown_operator_is_invalid_query() {
        let err = QueryOptions::parse(r#"{"where": [["name", "LIKE", "a%"]]}"#).unwrap_err();
        assert!(matches!(err, AcsysError::InvalidQuery { .. }));
        assert!("~=".parse::<Operator>().is_err());
    }

    #[test]
    fn test_non_scalar_value_is_invalid_query() {
        let err = QueryOptions::parse(r#"{"where": [["tags", "=", ["a"]]]}"#).unwrap_err();
        assert!(matches!(err, AcsysError::InvalidQuery { .. }));
    }

    #[test]
    fn test_string_and_number_values_stay_distinct() {
        let options =
            QueryOptions::parse(r#"{"where": [["n", "=", "5"], ["n", "=", 5], ["n", "=", 5.5]]}"#)
                .unwrap();
        assert_eq!(options.filters[0].value().kind(), ValueKind::Text);
        assert_eq!(options.filters[1].value(), &QueryValue::Integer(5));
        assert_eq!(options.filters[2].value(), &QueryValue::Float(5.5));
        assert_ne!(options.filters[0].value(), options.filters[1].value());
    }

    #[test]
    fn test_null_only_with_equality() {
        assert!(QueryOptions::parse(r#"{"where": [["deleted_at", "=", null]]}"#).is_ok());
        assert!(QueryOptions::parse(r#"{"where": [["deleted_at", "!=", null]]}"#).is_ok());
        let err = QueryOptions::parse(r#"{"where": [["deleted_at", "<", null]]}"#).unwrap_err();
        assert!(matches!(err, AcsysError::InvalidQuery { .. }));
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(QueryOptions::parse(r#"{"limit": 0}"#).is_err());
    }

    #[test]
    fn test_options_serialize_to_wire_shape() {
        let options = QueryOptions::all()
            .with_filter("username", Operator::Eq, "admin")
            .with_order(OrderBy::asc("username"));
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(
            value,
            json!({"where": [["username", "=", "admin"]], "order": ["username", "asc"]})
        );
    }

    #[test]
    fn test_page_cursor_encoding() {
        let cursor = PageCursor { offset: 40 }.encode();
        assert_eq!(PageCursor::decode(&cursor).unwrap().offset, 40);
        assert!(PageCursor::decode("not a cursor").is_err());
    }

    #[test]
    fn test_page_result_cursors() {
        let page = PageOptions {
            page_size: Some(2),
            ..Default::default()
        };
        let records = vec![crate::models::Record::new(), crate::models::Record::new()];
        let result = page.result(records, 5).unwrap();
        assert!(result.previous_cursor.is_none());
        let next = result.next_cursor.unwrap();
        assert_eq!(PageCursor::decode(&next).unwrap().offset, 2);

        let last = PageOptions {
            page_size: Some(2),
            cursor: Some(PageCursor { offset: 4 }.encode()),
            ..Default::default()
        };
        let result = last.result(vec![crate::models::Record::new()], 5).unwrap();
        assert!(result.next_cursor.is_none());
        let previous = result.previous_cursor.unwrap();
        assert_eq!(PageCursor::decode(&previous).unwrap().offset, 2);
    }

    #[test]
    fn test_page_size_bounds() {
        assert!(PageOptions::parse(r#"{"page_size": 0}"#).is_err());
        assert!(PageOptions::parse(r#"{"page_size": 1001}"#).is_err());
        assert_eq!(PageOptions::parse("{}").unwrap().page_size(), DEFAULT_PAGE_SIZE);
        assert!(PageOptions::parse(r#"{"cursor": "%%%"}"#).is_err());
    }
}
