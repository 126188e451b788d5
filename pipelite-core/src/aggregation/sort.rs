// src/aggregation/sort.rs
// $sort, $limit and $skip stages

use bson::{Bson, Document};
use std::cmp::Ordering;

use crate::error::{PipeliteError, Result};
use crate::value_utils::{as_f64, as_i64, compare_values_with_none, get_nested_value};

/// $sort stage - stable multi-key sort
#[derive(Debug, Clone)]
pub struct SortStage {
    fields: Vec<(String, SortDirection)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// $limit stage - keep the first n documents
#[derive(Debug, Clone)]
pub struct LimitStage {
    limit: usize,
}

/// $skip stage - drop the first n documents
#[derive(Debug, Clone)]
pub struct SkipStage {
    skip: usize,
}

impl SortStage {
    pub(crate) fn from_bson(spec: &Bson) -> Result<Self> {
        let obj = match spec {
            Bson::Document(obj) if !obj.is_empty() => obj,
            _ => {
                return Err(PipeliteError::AggregationError(
                    "$sort must be a non-empty object".to_string(),
                ))
            }
        };

        let mut fields = Vec::with_capacity(obj.len());
        for (field, value) in obj {
            let direction = match as_f64(value) {
                Some(n) if n == 1.0 => SortDirection::Ascending,
                Some(n) if n == -1.0 => SortDirection::Descending,
                _ => {
                    return Err(PipeliteError::AggregationError(
                        "Sort direction must be 1 or -1".to_string(),
                    ))
                }
            };
            fields.push((field.clone(), direction));
        }

        Ok(SortStage { fields })
    }

    pub fn execute(&self, mut docs: Vec<Document>) -> Vec<Document> {
        // sort_by is stable: ties keep their input order
        docs.sort_by(|a, b| {
            for (field, direction) in &self.fields {
                let cmp = compare_values_with_none(get_nested_value(a, field), get_nested_value(b, field));
                let cmp = match direction {
                    SortDirection::Ascending => cmp,
                    SortDirection::Descending => cmp.reverse(),
                };
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            Ordering::Equal
        });
        docs
    }
}

/// Non-negative whole number from any BSON numeric encoding
fn count_operand(spec: &Bson) -> Option<usize> {
    match as_i64(spec) {
        Some(n) => usize::try_from(n).ok(),
        None => match spec {
            Bson::Double(f) if f.fract() == 0.0 && *f >= 0.0 => Some(*f as usize),
            _ => None,
        },
    }
}

impl LimitStage {
    pub(crate) fn from_bson(spec: &Bson) -> Result<Self> {
        match count_operand(spec) {
            Some(n) if n > 0 => Ok(LimitStage { limit: n }),
            _ => Err(PipeliteError::AggregationError(
                "$limit must be a positive number".to_string(),
            )),
        }
    }

    pub fn execute(&self, docs: Vec<Document>) -> Vec<Document> {
        docs.into_iter().take(self.limit).collect()
    }
}

impl SkipStage {
    pub(crate) fn from_bson(spec: &Bson) -> Result<Self> {
        match count_operand(spec) {
            Some(n) => Ok(SkipStage { skip: n }),
            None => Err(PipeliteError::AggregationError(
                "$skip must be a non-negative number".to_string(),
            )),
        }
    }

    pub fn execute(&self, docs: Vec<Document>) -> Vec<Document> {
        docs.into_iter().skip(self.skip).collect()
    }
}
