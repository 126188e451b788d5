//! Value utility functions shared across modules
//!
//! Nested field access, value equality and ordering, and the canonical key
//! strings used to bucket `$group` keys.

use bson::{Bson, Document};
use std::cmp::Ordering;

use crate::document::{value_kind, ValueKind};

/// Get nested value from a document with dot notation support
///
/// Supports:
/// - Simple fields: "name"
/// - Nested documents: "address.city"
/// - Array indexing: "items.0.name"
///
/// Returns `None` (absent) when any segment is missing or when a segment
/// tries to descend into a scalar.
///
/// # Examples
///
/// ```
/// use bson::{doc, Bson};
/// use pipelite_core::value_utils::get_nested_value;
///
/// let doc = doc! {"address": {"city": "NYC"}};
/// assert_eq!(get_nested_value(&doc, "address.city"), Some(&Bson::String("NYC".into())));
/// assert_eq!(get_nested_value(&doc, "address.zip"), None);
/// ```
pub fn get_nested_value<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    // Fast path: no dots means simple field access
    if !path.contains('.') {
        return doc.get(path);
    }

    let mut parts = path.split('.');
    let mut value = doc.get(parts.next()?)?;
    for part in parts {
        value = match value {
            Bson::Document(inner) => inner.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Set a value at a nested path, creating intermediate documents
///
/// A non-document value sitting on the path is replaced by a document.
pub fn set_nested_value(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                set_nested_value(inner, rest, value);
            }
        }
    }
}

/// Remove the value at a nested path, returning it if it was present
pub fn remove_nested_value(doc: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Bson::Document(inner)) => remove_nested_value(inner, rest),
            _ => None,
        },
    }
}

/// Numeric view of a value (all BSON number encodings)
pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

/// Exact integer view of a value (`Int32` / `Int64` only)
pub fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        _ => None,
    }
}

/// Exact numeric ordering; integers are never rounded through `f64`
fn compare_numbers(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (as_i64(a), as_i64(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        (Some(x), None) => compare_int_float(x, as_f64(b)?),
        (None, Some(y)) => compare_int_float(y, as_f64(a)?).map(Ordering::reverse),
        (None, None) => as_f64(a)?.partial_cmp(&as_f64(b)?),
    }
}

fn compare_int_float(i: i64, f: f64) -> Option<Ordering> {
    if f.is_nan() {
        return None;
    }
    // i64::MAX as f64 is 2^63, one past the largest i64
    if f >= i64::MAX as f64 {
        return Some(Ordering::Less);
    }
    if f < i64::MIN as f64 {
        return Some(Ordering::Greater);
    }
    match i.cmp(&(f.trunc() as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&f.fract()),
        other => Some(other),
    }
}

/// Value equality used by `$eq`, `$ne`, `$in` and friends
///
/// Values of different kinds are never equal. Numbers compare by numeric
/// value regardless of encoding; identifiers by their canonical hex form.
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    if value_kind(a) != value_kind(b) {
        return false;
    }
    match (a, b) {
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(v, w)| values_equal(v, w))
        }
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.to_hex() == y.to_hex(),
        _ if value_kind(a) == ValueKind::Number => {
            compare_numbers(a, b) == Some(Ordering::Equal)
        }
        _ => a == b,
    }
}

/// Compare two values
///
/// Returns `Some(Ordering)` for values of the same orderable kind and `None`
/// for incompatible kinds (e.g. string vs number), which makes every ordering
/// predicate evaluate to false.
///
/// # Supported comparisons
///
/// - Number vs Number (natural order, any encoding)
/// - String vs String (lexicographic)
/// - Bool vs Bool (false < true)
/// - Date vs Date (chronological)
/// - ObjectId vs ObjectId (canonical hex string)
/// - Null vs Null (equal)
///
/// # Examples
///
/// ```
/// use bson::Bson;
/// use std::cmp::Ordering;
/// use pipelite_core::value_utils::compare_values;
///
/// assert_eq!(compare_values(&Bson::Int32(10), &Bson::Double(5.0)), Some(Ordering::Greater));
/// assert_eq!(compare_values(&Bson::String("a".into()), &Bson::String("b".into())), Some(Ordering::Less));
/// assert_eq!(compare_values(&Bson::String("a".into()), &Bson::Int32(1)), None);
/// ```
pub fn compare_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            Some(x.timestamp_millis().cmp(&y.timestamp_millis()))
        }
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.to_hex().cmp(&y.to_hex())),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ if value_kind(a) == ValueKind::Number && value_kind(b) == ValueKind::Number => {
            compare_numbers(a, b)
        }
        _ => None,
    }
}

/// Compare two optional values with absent handling
///
/// Used for sorting, where every pair needs a consistent answer.
///
/// # Ordering rules
///
/// - None < Some(_)
/// - Some(a) vs Some(b) uses compare_values
/// - Incompatible kinds return Equal (stable sort keeps input order)
pub fn compare_values_with_none(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(av), Some(bv)) => compare_values(av, bv).unwrap_or(Ordering::Equal),
    }
}

/// Canonical string form of a value, used as a `$group` bucket key
///
/// Two values produce the same string iff `values_equal` holds for them:
/// numbers are normalised across encodings and sub-document keys are sorted,
/// so `{"a": 1, "b": 2}` and `{"b": 2, "a": 1.0}` land in the same group.
///
/// # Examples
///
/// ```
/// use bson::{doc, Bson};
/// use pipelite_core::value_utils::canonical_key_string;
///
/// let v1 = Bson::Document(doc! {"a": 1, "b": 2});
/// let v2 = Bson::Document(doc! {"b": 2_i64, "a": 1.0});
/// assert_eq!(canonical_key_string(&v1), canonical_key_string(&v2));
/// ```
pub fn canonical_key_string(value: &Bson) -> String {
    match value {
        Bson::Null => "null".to_string(),
        Bson::Boolean(b) => format!("b:{}", b),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => canonical_number(value),
        Bson::String(s) => format!("s:{}", serde_json::Value::String(s.clone())),
        Bson::DateTime(dt) => format!("d:{}", dt.timestamp_millis()),
        Bson::ObjectId(oid) => format!("o:{}", oid.to_hex()),
        Bson::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical_key_string).collect();
            format!("[{}]", inner.join(","))
        }
        Bson::Document(doc) => {
            // Sort keys alphabetically for deterministic output
            let mut pairs: Vec<_> = doc.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));

            let inner: Vec<String> = pairs
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String((*k).clone()),
                        canonical_key_string(v)
                    )
                })
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        other => format!("x:{:?}", other),
    }
}

/// Integral doubles share the integer key, matching `compare_numbers` exactly
fn canonical_number(value: &Bson) -> String {
    if let Some(n) = as_i64(value) {
        return format!("n:{}", n);
    }
    let f = as_f64(value).unwrap_or(f64::NAN);
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        format!("n:{}", f as i64)
    } else {
        format!("n:{:?}", f)
    }
}
