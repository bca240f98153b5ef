//! BSON filter and sort documents for the document-store driver.
//!
//! Every predicate requires the field to exist, so filters on fields a
//! document lacks never match. The store's own comparison rules already keep
//! strings and numbers apart, which matches the relational rendering.
//!
//! Two store rules are overridden to keep results identical to the
//! relational drivers, which hold arrays as JSON text and compare temporal
//! values as text:
//! - An array field never equals a scalar and always satisfies `!=`. The
//!   store would otherwise match on any element. Ordering comparisons skip
//!   arrays.
//! - Text in RFC 3339 form also matches stored dates, since dates are read
//!   back as RFC 3339 text.

use super::{Filter, Operator, OrderBy, QueryValue, SortDirection};
use crate::Result;
use mongodb::bson::{Bson, DateTime, Document, doc, oid::ObjectId};

/// Document identifier field.
pub const ID_FIELD: &str = "_id";

/// Converts a filter value to BSON.
///
/// Text naming the identifier field is matched as an `ObjectId` when it
/// parses as one, because records expose identifiers as hex strings.
pub fn value_to_bson(field: &str, value: &QueryValue) -> Bson {
    match value {
        QueryValue::Bool(b) => Bson::Boolean(*b),
        QueryValue::Integer(i) => Bson::Int64(*i),
        QueryValue::Float(f) => Bson::Double(*f),
        QueryValue::Null => Bson::Null,
        QueryValue::Text(s) => {
            if field == ID_FIELD
                && let Ok(oid) = ObjectId::parse_str(s)
            {
                return Bson::ObjectId(oid);
            }
            Bson::String(s.clone())
        }
    }
}

fn operator_key(operator: Operator) -> &'static str {
    match operator {
        Operator::Eq => "$eq",
        Operator::Ne => "$ne",
        Operator::Lt => "$lt",
        Operator::Le => "$lte",
        Operator::Gt => "$gt",
        Operator::Ge => "$gte",
    }
}

/// BSON values a filter value stands for.
fn candidates(field: &str, value: &QueryValue) -> Vec<Bson> {
    let primary = value_to_bson(field, value);
    let date = match &primary {
        Bson::String(text) => DateTime::parse_rfc3339_str(text).ok().map(Bson::DateTime),
        _ => None,
    };
    std::iter::once(primary).chain(date).collect()
}

fn scalar_condition(operator: Operator, value: Bson) -> Document {
    let mut condition = doc! { "$exists": true, "$not": { "$type": "array" } };
    condition.insert(operator_key(operator), value);
    condition
}

fn predicate(filter: &Filter) -> Document {
    let field = filter.field();
    let mut values = candidates(field, filter.value());

    let operator = match (values.first(), filter.operator()) {
        (Some(Bson::Null), Operator::Ne) => Operator::Ne,
        (Some(Bson::Null), _) => Operator::Eq,
        (_, op) => op,
    };

    if operator == Operator::Ne {
        let unequal = match values.len() {
            1 => doc! { "$exists": true, "$ne": values.remove(0) },
            _ => doc! { "$exists": true, "$nin": values },
        };
        return doc! {
            "$or": [
                { field: { "$type": "array" } },
                { field: unequal },
            ]
        };
    }

    let mut clauses: Vec<Document> = values
        .into_iter()
        .map(|value| {
            let mut clause = Document::new();
            clause.insert(field, scalar_condition(operator, value));
            clause
        })
        .collect();

    match clauses.len() {
        1 => clauses.remove(0),
        _ => doc! { "$or": clauses },
    }
}

/// Builds the filter document for a conjunctive filter list.
///
/// An empty list yields an empty document, which matches everything.
pub fn filter_document(filters: &[Filter]) -> Result<Document> {
    for filter in filters {
        filter.validate()?;
    }

    Ok(match filters {
        [] => Document::new(),
        [single] => predicate(single),
        many => {
            let clauses: Vec<Bson> = many.iter().map(|f| Bson::Document(predicate(f))).collect();
            doc! { "$and": clauses }
        }
    })
}

/// Builds the sort document: the requested field, then the identifier.
pub fn sort_document(order: Option<&OrderBy>) -> Document {
    let mut sort = Document::new();
    if let Some(order) = order {
        let direction = match order.direction {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        };
        sort.insert(order.field.clone(), direction);
    }
    if !sort.contains_key(ID_FIELD) {
        sort.insert(ID_FIELD, 1);
    }
    sort
}
