//! Field inference for schemaless collections.
//!
//! Fields are discovered from a bounded sample of documents. Each field is
//! reported once, in first-seen order, with the kind of its most common
//! non-null value.

use crate::models::{FieldDescriptor, FieldKind};
use crate::query::document::ID_FIELD;
use mongodb::bson::{Bson, Document};
use std::collections::HashMap;

/// Documents sampled by `describe_table`.
pub const DESCRIBE_SAMPLE_SIZE: i64 = 100;

#[derive(Debug)]
struct FieldStats {
    type_counts: HashMap<&'static str, u32>,
    first_seen_position: u32,
}

/// Accumulates field statistics over sampled documents.
#[derive(Debug, Default)]
pub struct FieldInferrer {
    fields: HashMap<String, FieldStats>,
    next_position: u32,
}

impl FieldInferrer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the top-level fields of one document.
    pub fn analyze_document(&mut self, doc: &Document) {
        for (key, value) in doc {
            let type_name = bson_type_name(value);
            let next_position = &mut self.next_position;
            let stats = self.fields.entry(key.clone()).or_insert_with(|| {
                *next_position = next_position.saturating_add(1);
                FieldStats {
                    type_counts: HashMap::new(),
                    first_seen_position: *next_position,
                }
            });
            let count = stats.type_counts.entry(type_name).or_insert(0);
            *count = count.saturating_add(1);
        }
    }

    /// Produces descriptors ordered by first appearance.
    pub fn finalize(self) -> Vec<FieldDescriptor> {
        let mut fields: Vec<FieldDescriptor> = self
            .fields
            .into_iter()
            .map(|(name, stats)| {
                let primary_type = stats
                    .type_counts
                    .iter()
                    .filter(|(type_name, _)| **type_name != "null")
                    // Ties resolve by type name so the result is stable.
                    .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                    .map(|(type_name, _)| *type_name)
                    .unwrap_or("null");

                FieldDescriptor {
                    kind: type_name_to_kind(primary_type),
                    declared_type: primary_type.to_string(),
                    is_primary_key: name == ID_FIELD,
                    ordinal_position: stats.first_seen_position,
                    name,
                }
            })
            .collect();

        fields.sort_by_key(|f| f.ordinal_position);
        fields
    }
}

/// BSON type name as reported by `$type`.
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null | Bson::Undefined => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => "javascript",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Decimal128(_) => "decimal",
        _ => "other",
    }
}

fn type_name_to_kind(type_name: &str) -> FieldKind {
    match type_name {
        "string" | "objectId" => FieldKind::Text,
        "int" | "long" => FieldKind::Integer,
        "double" | "decimal" => FieldKind::Float,
        "bool" => FieldKind::Boolean,
        "date" | "timestamp" => FieldKind::Temporal,
        "binData" => FieldKind::Binary,
        "object" => FieldKind::Document,
        "array" => FieldKind::Array,
        _ => FieldKind::Other,
    }
}
