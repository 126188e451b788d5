// src/expression.rs
//! Expressions evaluated against a single document
//!
//! An expression is either a literal value or a `$field.path` reference.
//! Resolution never fails: a path that does not lead anywhere yields `None`,
//! the absent sentinel, which is distinct from an explicit `Bson::Null`.

use bson::{Bson, Document};

use crate::error::{PipeliteError, Result};
use crate::value_utils::get_nested_value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Constant value, returned unchanged
    Literal(Bson),
    /// Dotted field path (stored without the leading `$`)
    FieldPath(String),
}

impl Expression {
    /// Parse an expression from its BSON form
    ///
    /// - `"$amount"` → field path `amount`
    /// - `{"$literal": v}` → literal `v` (even when `v` is a `$` string)
    /// - anything else → literal
    pub fn from_bson(value: &Bson) -> Result<Self> {
        match value {
            Bson::String(s) if s.starts_with('$') => Self::field_path(s),
            Bson::Document(doc) if doc.len() == 1 && doc.contains_key("$literal") => {
                Ok(Expression::Literal(doc.get("$literal").cloned().unwrap_or(Bson::Null)))
            }
            other => Ok(Expression::Literal(other.clone())),
        }
    }

    /// Build a field-path expression from a `$`-prefixed reference
    pub fn field_path(reference: &str) -> Result<Self> {
        let path = reference.strip_prefix('$').ok_or_else(|| {
            PipeliteError::AggregationError(format!(
                "Field reference must start with $: {}",
                reference
            ))
        })?;
        if path.is_empty() || path.split('.').any(|segment| segment.is_empty()) {
            return Err(PipeliteError::AggregationError(format!(
                "Invalid field path: {}",
                reference
            )));
        }
        Ok(Expression::FieldPath(path.to_string()))
    }

    /// Resolve against a document
    ///
    /// Literals come back unchanged; field paths descend through nested
    /// documents and return `None` as soon as a segment is missing.
    pub fn resolve<'a>(&'a self, doc: &'a Document) -> Option<&'a Bson> {
        match self {
            Expression::Literal(value) => Some(value),
            Expression::FieldPath(path) => get_nested_value(doc, path),
        }
    }

    pub fn is_field_path(&self) -> bool {
        matches!(self, Expression::FieldPath(_))
    }
}

/// Free-function form of [`Expression::resolve`]
pub fn resolve<'a>(doc: &'a Document, expr: &'a Expression) -> Option<&'a Bson> {
    expr.resolve(doc)
}
