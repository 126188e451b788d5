// src/query.rs
//! `$match` predicates
//!
//! A predicate document such as
//!
//! ```json
//! { "amount": { "$gt": 500, "$lte": 5000 }, "category": "Travel" }
//! ```
//!
//! is compiled once into a [`Predicate`]: each field maps to either a bare
//! literal (implicit `$eq`) or a list of operator conditions whose matchers
//! were looked up in the operator registry at build time. Fields, and the
//! operators on one field, are AND-combined. Top-level `$and` / `$or` take an
//! array of nested predicate documents.

pub mod operators;

use bson::{Bson, Document};
use std::fmt;

use crate::error::{PipeliteError, Result};
use crate::value_utils::get_nested_value;
use operators::{lookup_operator, EqOperator, OperatorMatcher};

/// Compiled `$match` predicate (a field constraint map)
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone)]
enum Clause {
    Field(FieldConstraint),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

/// Constraint on a single (possibly dotted) field
#[derive(Debug, Clone)]
pub struct FieldConstraint {
    field: String,
    constraint: Constraint,
}

/// Either shorthand equality or an operator map
#[derive(Debug, Clone)]
pub enum Constraint {
    /// `{ field: literal }`
    Equals(Bson),
    /// `{ field: { $op: operand, ... } }`
    Operators(Vec<Condition>),
}

/// One operator applied to one operand
#[derive(Clone)]
pub struct Condition {
    operator: &'static dyn OperatorMatcher,
    operand: Bson,
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("operator", &self.operator.name())
            .field("operand", &self.operand)
            .finish()
    }
}

impl Condition {
    fn new(name: &str, operand: &Bson) -> Result<Self> {
        let operator = lookup_operator(name)?;
        operator.validate(operand)?;
        Ok(Condition {
            operator,
            operand: operand.clone(),
        })
    }

    pub fn operator_name(&self) -> &'static str {
        self.operator.name()
    }

    fn matches(&self, doc_value: Option<&Bson>) -> bool {
        self.operator.matches(doc_value, &self.operand)
    }
}

impl Predicate {
    /// Predicate that matches every document (`{}`)
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a predicate document
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for unknown operators, bad operands, mixed operator and
    /// plain keys inside one field's constraint, and malformed `$and`/`$or`.
    pub fn from_document(filter: &Document) -> Result<Self> {
        let mut clauses = Vec::with_capacity(filter.len());

        for (key, value) in filter {
            let clause = match key.as_str() {
                "$and" => Clause::And(parse_logical_array("$and", value)?),
                "$or" => Clause::Or(parse_logical_array("$or", value)?),
                k if k.starts_with('$') => {
                    return Err(PipeliteError::InvalidQuery(format!(
                        "Unknown top-level operator: {}",
                        k
                    )));
                }
                _ => Clause::Field(FieldConstraint::parse(key, value)?),
            };
            clauses.push(clause);
        }

        Ok(Predicate { clauses })
    }

    /// Compile a predicate from a BSON value that must be a document
    pub fn from_bson(filter: &Bson) -> Result<Self> {
        match filter {
            Bson::Document(doc) => Self::from_document(doc),
            _ => Err(PipeliteError::InvalidQuery(
                "Filter must be a document".to_string(),
            )),
        }
    }

    /// Evaluate against a document
    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Field(constraint) => constraint.matches(doc),
            Clause::And(children) => children.iter().all(|p| p.matches(doc)),
            Clause::Or(children) => children.iter().any(|p| p.matches(doc)),
        })
    }

    /// AND-combine two predicates
    pub fn and(mut self, other: Predicate) -> Predicate {
        self.clauses.extend(other.clauses);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl FieldConstraint {
    fn parse(field: &str, value: &Bson) -> Result<Self> {
        if field.is_empty() || field.split('.').any(|segment| segment.is_empty()) {
            return Err(PipeliteError::InvalidQuery(format!(
                "Invalid field name: '{}'",
                field
            )));
        }

        let constraint = match value {
            Bson::Document(spec) if is_operator_document(spec)? => {
                let conditions = spec
                    .iter()
                    .map(|(op, operand)| Condition::new(op, operand))
                    .collect::<Result<Vec<_>>>()?;
                Constraint::Operators(conditions)
            }
            literal => Constraint::Equals(literal.clone()),
        };

        Ok(FieldConstraint {
            field: field.to_string(),
            constraint,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    fn matches(&self, doc: &Document) -> bool {
        let doc_value = get_nested_value(doc, &self.field);
        match &self.constraint {
            Constraint::Equals(literal) => EqOperator.matches(doc_value, literal),
            Constraint::Operators(conditions) => {
                conditions.iter().all(|condition| condition.matches(doc_value))
            }
        }
    }
}

/// A sub-document is an operator map when its keys start with `$`
///
/// Mixing `$` and plain keys is ambiguous and rejected; an empty document is
/// an equality literal.
fn is_operator_document(spec: &Document) -> Result<bool> {
    let operator_keys = spec.keys().filter(|k| k.starts_with('$')).count();
    if operator_keys == 0 {
        Ok(false)
    } else if operator_keys == spec.len() {
        Ok(true)
    } else {
        Err(PipeliteError::InvalidQuery(
            "Cannot mix operators and fields in one condition".to_string(),
        ))
    }
}

fn parse_logical_array(name: &str, value: &Bson) -> Result<Vec<Predicate>> {
    let items = match value {
        Bson::Array(items) => items,
        _ => {
            return Err(PipeliteError::InvalidQuery(format!(
                "{} operator requires an array",
                name
            )))
        }
    };
    if items.is_empty() {
        return Err(PipeliteError::InvalidQuery(format!(
            "{} array must not be empty",
            name
        )));
    }
    items.iter().map(Predicate::from_bson).collect()
}

// ============================================================================
// TESTS
// ============================================================================
