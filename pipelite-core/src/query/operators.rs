// src/query/operators.rs
//! Comparison operators for `$match` predicates
//!
//! Each operator is a separate type implementing [`OperatorMatcher`]. The
//! global [`OPERATOR_REGISTRY`] maps operator names to implementations; a
//! predicate looks its operators up once, when the stage is built, and keeps
//! `&'static` references to them for evaluation.
//!
//! ```text
//! OperatorMatcher trait
//!     ↓
//! ┌──────────────────────────┬────────────────┬────────────┐
//! │ Comparison               │ Set            │ Element    │
//! │ ($eq $ne $gt $gte $lt …) │ ($in $nin)     │ ($exists)  │
//! └──────────────────────────┴────────────────┴────────────┘
//! ```

use bson::Bson;
use lazy_static::lazy_static;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{PipeliteError, Result};
use crate::value_utils::{compare_values, values_equal};

// ============================================================================
// TRAIT DEFINITION
// ============================================================================

/// Trait for all predicate operators
///
/// Evaluation is infallible: operand shape is checked by `validate` when the
/// predicate is built, and data problems (absent fields, kind mismatches)
/// simply fail to match.
///
/// # Examples
///
/// ```rust
/// use bson::Bson;
/// use pipelite_core::query::operators::{GtOperator, OperatorMatcher};
///
/// let gt = GtOperator;
/// assert!(gt.matches(Some(&Bson::Int32(6400)), &Bson::Int32(1000)));
/// assert!(!gt.matches(None, &Bson::Int32(1000)));
/// ```
pub trait OperatorMatcher: Send + Sync {
    /// Returns the operator name (e.g., "$eq", "$gt")
    fn name(&self) -> &'static str;

    /// Checks the operand when the predicate is built
    fn validate(&self, _operand: &Bson) -> Result<()> {
        Ok(())
    }

    /// Checks a document value against the operand
    ///
    /// `doc_value` is `None` when the field is absent from the document.
    fn matches(&self, doc_value: Option<&Bson>, operand: &Bson) -> bool;
}

// ============================================================================
// COMPARISON OPERATORS
// ============================================================================

/// $eq: value equals the operand, or an array value contains it
///
/// Absent never equals anything.
pub struct EqOperator;

impl OperatorMatcher for EqOperator {
    fn name(&self) -> &'static str {
        "$eq"
    }

    fn matches(&self, doc_value: Option<&Bson>, operand: &Bson) -> bool {
        match doc_value {
            None => false,
            Some(v) => {
                if values_equal(v, operand) {
                    return true;
                }
                match v {
                    Bson::Array(items) => items.iter().any(|elem| values_equal(elem, operand)),
                    _ => false,
                }
            }
        }
    }
}

/// $ne: negation of $eq, so it matches absent fields
pub struct NeOperator;

impl OperatorMatcher for NeOperator {
    fn name(&self) -> &'static str {
        "$ne"
    }

    fn matches(&self, doc_value: Option<&Bson>, operand: &Bson) -> bool {
        !EqOperator.matches(doc_value, operand)
    }
}

pub struct GtOperator;

impl OperatorMatcher for GtOperator {
    fn name(&self) -> &'static str {
        "$gt"
    }

    fn matches(&self, doc_value: Option<&Bson>, operand: &Bson) -> bool {
        compare_with_predicate(doc_value, operand, |ord| ord == Ordering::Greater)
    }
}

pub struct GteOperator;

impl OperatorMatcher for GteOperator {
    fn name(&self) -> &'static str {
        "$gte"
    }

    fn matches(&self, doc_value: Option<&Bson>, operand: &Bson) -> bool {
        compare_with_predicate(doc_value, operand, |ord| ord != Ordering::Less)
    }
}

pub struct LtOperator;

impl OperatorMatcher for LtOperator {
    fn name(&self) -> &'static str {
        "$lt"
    }

    fn matches(&self, doc_value: Option<&Bson>, operand: &Bson) -> bool {
        compare_with_predicate(doc_value, operand, |ord| ord == Ordering::Less)
    }
}

pub struct LteOperator;

impl OperatorMatcher for LteOperator {
    fn name(&self) -> &'static str {
        "$lte"
    }

    fn matches(&self, doc_value: Option<&Bson>, operand: &Bson) -> bool {
        compare_with_predicate(doc_value, operand, |ord| ord != Ordering::Greater)
    }
}

// ============================================================================
// SET OPERATORS
// ============================================================================

fn require_array(name: &str, operand: &Bson) -> Result<()> {
    match operand {
        Bson::Array(_) => Ok(()),
        _ => Err(PipeliteError::InvalidQuery(format!(
            "{} operator requires an array",
            name
        ))),
    }
}

/// $in: value equals any element of the operand array
pub struct InOperator;

impl OperatorMatcher for InOperator {
    fn name(&self) -> &'static str {
        "$in"
    }

    fn validate(&self, operand: &Bson) -> Result<()> {
        require_array(self.name(), operand)
    }

    fn matches(&self, doc_value: Option<&Bson>, operand: &Bson) -> bool {
        match operand {
            Bson::Array(candidates) => candidates
                .iter()
                .any(|candidate| EqOperator.matches(doc_value, candidate)),
            _ => false,
        }
    }
}

/// $nin: negation of $in, so it matches absent fields
pub struct NinOperator;

impl OperatorMatcher for NinOperator {
    fn name(&self) -> &'static str {
        "$nin"
    }

    fn validate(&self, operand: &Bson) -> Result<()> {
        require_array(self.name(), operand)
    }

    fn matches(&self, doc_value: Option<&Bson>, operand: &Bson) -> bool {
        !InOperator.matches(doc_value, operand)
    }
}

// ============================================================================
// ELEMENT OPERATORS
// ============================================================================

/// $exists: field presence (an explicit null counts as present)
pub struct ExistsOperator;

impl OperatorMatcher for ExistsOperator {
    fn name(&self) -> &'static str {
        "$exists"
    }

    fn validate(&self, operand: &Bson) -> Result<()> {
        match operand {
            Bson::Boolean(_) => Ok(()),
            _ => Err(PipeliteError::InvalidQuery(
                "$exists operator requires a boolean".to_string(),
            )),
        }
    }

    fn matches(&self, doc_value: Option<&Bson>, operand: &Bson) -> bool {
        match operand {
            Bson::Boolean(should_exist) => doc_value.is_some() == *should_exist,
            _ => false,
        }
    }
}

// ============================================================================
// OPERATOR REGISTRY
// ============================================================================

lazy_static! {
    /// Global registry of predicate operators, keyed by name
    ///
    /// Initialised once and immutable afterwards.
    pub static ref OPERATOR_REGISTRY: HashMap<&'static str, Box<dyn OperatorMatcher>> = {
        let mut registry: HashMap<&'static str, Box<dyn OperatorMatcher>> = HashMap::new();

        // Comparison operators
        registry.insert("$eq", Box::new(EqOperator));
        registry.insert("$ne", Box::new(NeOperator));
        registry.insert("$gt", Box::new(GtOperator));
        registry.insert("$gte", Box::new(GteOperator));
        registry.insert("$lt", Box::new(LtOperator));
        registry.insert("$lte", Box::new(LteOperator));

        // Set operators
        registry.insert("$in", Box::new(InOperator));
        registry.insert("$nin", Box::new(NinOperator));

        // Element operators
        registry.insert("$exists", Box::new(ExistsOperator));

        registry
    };
}

/// Look up an operator by name
pub fn lookup_operator(name: &str) -> Result<&'static dyn OperatorMatcher> {
    OPERATOR_REGISTRY
        .get(name)
        .map(|op| op.as_ref())
        .ok_or_else(|| PipeliteError::InvalidQuery(format!("Unknown operator: {}", name)))
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Generic comparison helper for $gt, $gte, $lt, $lte
///
/// Incomparable kinds never match. An array value matches when any of its
/// elements satisfies the predicate.
fn compare_with_predicate<F>(doc_value: Option<&Bson>, operand: &Bson, predicate: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    match doc_value {
        None => false,
        Some(v) => {
            if compare_values(v, operand).map(&predicate).unwrap_or(false) {
                return true;
            }
            match v {
                Bson::Array(items) => items.iter().any(|elem| {
                    compare_values(elem, operand)
                        .map(&predicate)
                        .unwrap_or(false)
                }),
                _ => false,
            }
        }
    }
}
