//! BSON to JSON projection for administrative command responses.
//!
//! Dates become epoch milliseconds and timestamps `{"t", "i"}`, so the
//! normalizer can do arithmetic on them without knowing about BSON.

use mongodb::bson::{Bson, Document};
use serde_json::{json, Map, Value};

pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Double(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => document_to_json(doc),
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Int32(i) => json!(i),
        Bson::Int64(i) => json!(i),
        Bson::DateTime(dt) => json!(dt.timestamp_millis()),
        Bson::Timestamp(ts) => json!({"t": ts.time, "i": ts.increment}),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        other => Value::String(other.to_string()),
    }
}

pub fn document_to_json(doc: &Document) -> Value {
    Value::Object(
        doc.iter()
            .map(|(k, v)| (k.clone(), bson_to_json(v)))
            .collect::<Map<_, _>>(),
    )
}

/// Only `fields` of `doc`, skipping absent ones.
pub fn pick(doc: &Document, fields: &[&str]) -> Value {
    let mut out = Map::new();
    for field in fields {
        if let Some(value) = doc.get(*field) {
            out.insert((*field).to_string(), bson_to_json(value));
        }
    }
    Value::Object(out)
}

/// Index key pattern as `[[field, direction], ...]`, keeping field order,
/// which JSON objects do not guarantee.
pub fn key_pattern(key: &Document) -> Value {
    Value::Array(
        key.iter()
            .map(|(field, direction)| json!([field, bson_to_json(direction)]))
            .collect(),
    )
}
