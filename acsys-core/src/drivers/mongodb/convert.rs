//! Conversion between BSON documents and records.
//!
//! Identifiers are exposed as 24-character hex strings and dates as RFC 3339
//! strings; other BSON-only types use relaxed extended JSON.

use crate::models::Record;
use crate::query::document::ID_FIELD;
use mongodb::bson::{Bson, Document, oid::ObjectId};
use serde_json::Value as JsonValue;

/// Converts a BSON value to JSON.
pub fn bson_to_json(value: Bson) -> JsonValue {
    match value {
        Bson::Null | Bson::Undefined => JsonValue::Null,
        Bson::Boolean(b) => JsonValue::Bool(b),
        Bson::Int32(i) => JsonValue::Number(i.into()),
        Bson::Int64(i) => JsonValue::Number(i.into()),
        Bson::Double(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Bson::String(s) => JsonValue::String(s),
        Bson::ObjectId(oid) => JsonValue::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(text) => JsonValue::String(text),
            Err(_) => Bson::DateTime(dt).into_relaxed_extjson(),
        },
        Bson::Array(items) => JsonValue::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Document(doc) => JsonValue::Object(document_to_record(doc)),
        other => other.into_relaxed_extjson(),
    }
}

/// Converts a document to a record.
pub fn document_to_record(doc: Document) -> Record {
    doc.into_iter()
        .map(|(key, value)| (key, bson_to_json(value)))
        .collect()
}

/// Converts a JSON value to BSON.
pub fn json_to_bson(value: &JsonValue) -> Bson {
    match value {
        JsonValue::Null => Bson::Null,
        JsonValue::Bool(b) => Bson::Boolean(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Bson::Int64(i),
            None => Bson::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Bson::String(s.clone()),
        JsonValue::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect()),
        JsonValue::Object(map) => {
            let mut doc = Document::new();
            for (key, value) in map {
                doc.insert(key.clone(), json_to_bson(value));
            }
            Bson::Document(doc)
        }
    }
}

/// Converts a record to a document.
///
/// A top-level `_id` that parses as an object id is stored as one, so that
/// identifiers read back by this driver round-trip.
pub fn record_to_document(record: &Record) -> Document {
    let mut doc = Document::new();
    for (key, value) in record {
        let bson = match (key.as_str(), value) {
            (ID_FIELD, JsonValue::String(s)) => ObjectId::parse_str(s)
                .map(Bson::ObjectId)
                .unwrap_or_else(|_| Bson::String(s.clone())),
            _ => json_to_bson(value),
        };
        doc.insert(key.clone(), bson);
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use serde_json::json;

    #[test]
    fn test_document_to_record() {
        let oid = ObjectId::new();
        let doc = doc! {
            "_id": oid,
            "title": "hello",
            "views": 5_i32,
            "score": 1.5,
            "tags": ["a", "b"],
            "meta": { "draft": true },
            "gone": Bson::Null,
        };

        let record = document_to_record(doc);
        assert_eq!(record["_id"], json!(oid.to_hex()));
        assert_eq!(record["title"], json!("hello"));
        assert_eq!(record["views"], json!(5));
        assert_eq!(record["score"], json!(1.5));
        assert_eq!(record["tags"], json!(["a", "b"]));
        assert_eq!(record["meta"], json!({"draft": true}));
        assert_eq!(record["gone"], JsonValue::Null);
    }

    #[test]
    fn test_datetime_becomes_rfc3339() {
        let dt = mongodb::bson::DateTime::from_millis(0);
        assert_eq!(
            bson_to_json(Bson::DateTime(dt)),
            json!("1970-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_record_to_document_restores_object_ids() {
        let oid = ObjectId::new();
        let record = match json!({"_id": oid.to_hex(), "n": 2, "f": 0.5, "ref": oid.to_hex()}) {
            JsonValue::Object(map) => map,
            _ => unreachable!(),
        };
        let doc = record_to_document(&record);
        assert_eq!(doc.get("_id"), Some(&Bson::ObjectId(oid)));
        assert_eq!(doc.get("n"), Some(&Bson::Int64(2)));
        assert_eq!(doc.get("f"), Some(&Bson::Double(0.5)));
        // Only the identifier field is converted.
        assert_eq!(doc.get("ref"), Some(&Bson::String(oid.to_hex())));
    }
}
