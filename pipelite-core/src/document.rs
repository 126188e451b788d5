// src/document.rs
//! Document model
//!
//! Documents are insertion-ordered `bson::Document` maps and field values are
//! `bson::Bson`. BSON already carries every value kind the engine needs:
//! numbers, strings, booleans, UTC dates, 12-byte object identifiers, null and
//! nested documents.
//!
//! This module also hosts the extended-JSON bridge used by stores to normalise
//! their records: `{"$oid": "..."}` and `{"$date": ...}` wrappers become real
//! identifier and date values before the engine ever sees them.

use bson::{Bson, Document};
use serde_json::{json, Value as JsonValue};

use crate::error::{PipeliteError, Result};

/// Coarse kind of a value, used to decide whether two values are comparable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    String,
    Bool,
    Date,
    ObjectId,
    Null,
    Document,
    Array,
    Other,
}

/// Classify a BSON value
///
/// All numeric encodings (`Int32`, `Int64`, `Double`) share one kind.
pub fn value_kind(value: &Bson) -> ValueKind {
    match value {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => ValueKind::Number,
        Bson::String(_) => ValueKind::String,
        Bson::Boolean(_) => ValueKind::Bool,
        Bson::DateTime(_) => ValueKind::Date,
        Bson::ObjectId(_) => ValueKind::ObjectId,
        Bson::Null => ValueKind::Null,
        Bson::Document(_) => ValueKind::Document,
        Bson::Array(_) => ValueKind::Array,
        _ => ValueKind::Other,
    }
}

/// Narrowest BSON integer for an i64 (Int32 when it fits)
pub fn int_to_bson(n: i64) -> Bson {
    match i32::try_from(n) {
        Ok(small) => Bson::Int32(small),
        Err(_) => Bson::Int64(n),
    }
}

/// Parse an RFC 3339 timestamp into a BSON date
pub fn parse_date(s: &str) -> Result<bson::DateTime> {
    bson::DateTime::parse_rfc3339_str(s)
        .map_err(|e| PipeliteError::Serialization(format!("Invalid $date '{}': {}", s, e)))
}

/// Convert an extended-JSON value into BSON
///
/// Relaxed and canonical extended JSON are both accepted (`{"$oid": ...}`,
/// `{"$date": "<rfc3339>"}`, `{"$date": {"$numberLong": ...}}`, ...), plus the
/// legacy `{"$date": <millis>}` form older exports still carry.
///
/// Integers become `Int32` when they fit, `Int64` otherwise.
pub fn from_json_value(value: &JsonValue) -> Result<Bson> {
    Bson::try_from(expand_legacy_dates(value.clone()))
        .map_err(|e| PipeliteError::Serialization(format!("Invalid extended JSON: {}", e)))
}

/// Convert a JSON object into a document (extended-JSON aware)
pub fn document_from_json(value: &JsonValue) -> Result<Document> {
    match from_json_value(value)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(PipeliteError::Serialization(format!(
            "Document must be an object, got {}",
            other
        ))),
    }
}

/// Rewrite `{"$date": <millis>}` into the canonical `$numberLong` body
fn expand_legacy_dates(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            if map.len() == 1 {
                if let Some(millis) = map.get("$date").and_then(JsonValue::as_i64) {
                    return json!({"$date": {"$numberLong": millis.to_string()}});
                }
            }
            JsonValue::Object(
                map.into_iter()
                    .map(|(key, inner)| (key, expand_legacy_dates(inner)))
                    .collect(),
            )
        }
        JsonValue::Array(items) => {
            JsonValue::Array(items.into_iter().map(expand_legacy_dates).collect())
        }
        other => other,
    }
}

/// Convert BSON back into relaxed extended JSON
///
/// Identifiers and dates come out as `$oid` / `$date` wrappers, so
/// `from_json_value(&to_json_value(v))` yields `v` again for every kind the
/// engine produces.
pub fn to_json_value(value: &Bson) -> JsonValue {
    value.clone().into_relaxed_extjson()
}

/// Convert a document into an extended-JSON object
pub fn document_to_json(doc: &Document) -> JsonValue {
    Bson::Document(doc.clone()).into_relaxed_extjson()
}
