// src/aggregation/group.rs
// $group stage - single-pass grouping with per-group accumulator folds

use bson::{Bson, Document};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::document::int_to_bson;
use crate::error::{PipeliteError, Result};
use crate::expression::Expression;
use crate::value_utils::{as_f64, as_i64, canonical_key_string, compare_values};

/// $group stage - group documents and compute aggregates
#[derive(Debug, Clone)]
pub struct GroupStage {
    id: GroupId,
    /// Output field → accumulator, in declaration order
    accumulators: Vec<(String, Accumulator)>,
}

/// Grouping key expression
#[derive(Debug, Clone, PartialEq)]
pub enum GroupId {
    /// `"$category"`, or a literal such as `null` (one group for everything)
    Expression(Expression),
    /// `{ cat: "$category", mode: "$mode" }`
    Compound(Vec<(String, Expression)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Sum(Expression),
    Avg(Expression),
    Min(Expression),
    Max(Expression),
    First(Expression),
    Last(Expression),
    Count,
}

/// Running state of one accumulator inside one group
#[derive(Debug, Clone)]
enum AccumulatorState {
    Sum {
        int_total: i64,
        float_total: f64,
        has_float: bool,
    },
    Avg {
        total: f64,
        count: u64,
    },
    Extremum {
        best: Option<Bson>,
        keep: Ordering,
    },
    First(Option<Bson>),
    Last(Bson),
    Count(i64),
}

/// One group being built: its key and one state per accumulator
struct GroupSlot {
    id: Bson,
    states: Vec<AccumulatorState>,
}

impl GroupId {
    fn from_bson(value: &Bson) -> Result<Self> {
        match value {
            Bson::Document(doc) if !doc.contains_key("$literal") => {
                let mut fields = Vec::with_capacity(doc.len());
                for (name, expr) in doc {
                    if name.starts_with('$') {
                        return Err(PipeliteError::AggregationError(format!(
                            "Unknown group _id operator: {}",
                            name
                        )));
                    }
                    fields.push((name.clone(), Expression::from_bson(expr)?));
                }
                Ok(GroupId::Compound(fields))
            }
            other => Ok(GroupId::Expression(Expression::from_bson(other)?)),
        }
    }

    /// Evaluate the key for one document; an absent key groups under null
    fn evaluate(&self, doc: &Document) -> Bson {
        match self {
            GroupId::Expression(expr) => expr.resolve(doc).cloned().unwrap_or(Bson::Null),
            GroupId::Compound(fields) => {
                let mut key = Document::new();
                for (name, expr) in fields {
                    if let Some(value) = expr.resolve(doc) {
                        key.insert(name.clone(), value.clone());
                    }
                }
                Bson::Document(key)
            }
        }
    }
}

impl GroupStage {
    pub fn new(id: GroupId, accumulators: Vec<(String, Accumulator)>) -> Self {
        GroupStage { id, accumulators }
    }

    pub(crate) fn from_bson(spec: &Bson) -> Result<Self> {
        let obj = match spec {
            Bson::Document(obj) => obj,
            _ => {
                return Err(PipeliteError::AggregationError(
                    "$group must be an object".to_string(),
                ))
            }
        };

        let id = match obj.get("_id") {
            Some(id_value) => GroupId::from_bson(id_value)?,
            None => {
                return Err(PipeliteError::AggregationError(
                    "Group stage must have _id field".to_string(),
                ))
            }
        };

        let mut accumulators = Vec::with_capacity(obj.len().saturating_sub(1));
        for (field, value) in obj {
            if field == "_id" {
                continue;
            }
            if field.contains('.') || field.starts_with('$') {
                return Err(PipeliteError::AggregationError(format!(
                    "Invalid group output field name: {}",
                    field
                )));
            }
            accumulators.push((field.clone(), Accumulator::from_bson(value)?));
        }

        Ok(GroupStage { id, accumulators })
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    /// Group in one pass; groups are emitted in first-seen key order
    pub fn execute(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<GroupSlot> = Vec::new();

        for doc in &docs {
            let key = self.id.evaluate(doc);
            let canonical = canonical_key_string(&key);

            let slot = match slots.get(&canonical) {
                Some(&slot) => slot,
                None => {
                    groups.push(GroupSlot {
                        id: key,
                        states: self
                            .accumulators
                            .iter()
                            .map(|(_, acc)| acc.initial_state())
                            .collect(),
                    });
                    slots.insert(canonical, groups.len() - 1);
                    groups.len() - 1
                }
            };

            let group = &mut groups[slot];
            for ((_, accumulator), state) in self.accumulators.iter().zip(group.states.iter_mut()) {
                accumulator.fold(state, doc);
            }
        }

        groups
            .into_iter()
            .map(|group| {
                let mut result = Document::new();
                result.insert("_id", group.id);
                for ((field, _), state) in self.accumulators.iter().zip(group.states) {
                    result.insert(field.clone(), state.finalize());
                }
                result
            })
            .collect()
    }
}

impl Accumulator {
    pub(crate) fn from_bson(spec: &Bson) -> Result<Self> {
        let obj = match spec {
            Bson::Document(obj) => obj,
            _ => {
                return Err(PipeliteError::AggregationError(
                    "Accumulator must be an object".to_string(),
                ))
            }
        };
        if obj.len() != 1 {
            return Err(PipeliteError::AggregationError(
                "Accumulator must have exactly one operator".to_string(),
            ));
        }

        let (op, value) = match obj.iter().next() {
            Some(entry) => entry,
            None => {
                return Err(PipeliteError::AggregationError(
                    "Accumulator must have exactly one operator".to_string(),
                ))
            }
        };

        match op.as_str() {
            "$sum" => Ok(Accumulator::Sum(parse_operand(value, "$sum")?)),
            "$avg" => Ok(Accumulator::Avg(parse_operand(value, "$avg")?)),
            "$min" => Ok(Accumulator::Min(parse_operand(value, "$min")?)),
            "$max" => Ok(Accumulator::Max(parse_operand(value, "$max")?)),
            "$first" => Ok(Accumulator::First(parse_operand(value, "$first")?)),
            "$last" => Ok(Accumulator::Last(parse_operand(value, "$last")?)),
            "$count" => match value {
                Bson::Document(args) if args.is_empty() => Ok(Accumulator::Count),
                _ => Err(PipeliteError::AggregationError(
                    format!("$count takes an empty document, got {}", value),
                )),
            },
            _ => Err(PipeliteError::AggregationError(format!(
                "Unknown accumulator: {}",
                op
            ))),
        }
    }

    fn initial_state(&self) -> AccumulatorState {
        match self {
            Accumulator::Sum(_) => AccumulatorState::Sum {
                int_total: 0,
                float_total: 0.0,
                has_float: false,
            },
            Accumulator::Avg(_) => AccumulatorState::Avg { total: 0.0, count: 0 },
            Accumulator::Min(_) => AccumulatorState::Extremum {
                best: None,
                keep: Ordering::Less,
            },
            Accumulator::Max(_) => AccumulatorState::Extremum {
                best: None,
                keep: Ordering::Greater,
            },
            Accumulator::First(_) => AccumulatorState::First(None),
            Accumulator::Last(_) => AccumulatorState::Last(Bson::Null),
            Accumulator::Count => AccumulatorState::Count(0),
        }
    }

    fn fold(&self, state: &mut AccumulatorState, doc: &Document) {
        match (self, state) {
            (
                Accumulator::Sum(expr),
                AccumulatorState::Sum {
                    int_total,
                    float_total,
                    has_float,
                },
            ) => {
                // Non-numeric and absent values add nothing
                if let Some(value) = expr.resolve(doc) {
                    if let Some(n) = as_i64(value) {
                        match int_total.checked_add(n) {
                            Some(total) => *int_total = total,
                            None => {
                                // i64 overflow: continue the total as a double
                                *float_total += *int_total as f64 + n as f64;
                                *int_total = 0;
                                *has_float = true;
                            }
                        }
                    } else if let Some(f) = as_f64(value) {
                        *float_total += f;
                        *has_float = true;
                    }
                }
            }
            (Accumulator::Avg(expr), AccumulatorState::Avg { total, count }) => {
                if let Some(n) = expr.resolve(doc).and_then(as_f64) {
                    *total += n;
                    *count += 1;
                }
            }
            (
                Accumulator::Min(expr) | Accumulator::Max(expr),
                AccumulatorState::Extremum { best, keep },
            ) => {
                let candidate = match expr.resolve(doc) {
                    None | Some(Bson::Null) => return,
                    Some(value) => value,
                };
                let replace = match best {
                    None => true,
                    Some(current) => compare_values(candidate, current) == Some(*keep),
                };
                if replace {
                    *best = Some(candidate.clone());
                }
            }
            (Accumulator::First(expr), AccumulatorState::First(first)) => {
                if first.is_none() {
                    *first = Some(expr.resolve(doc).cloned().unwrap_or(Bson::Null));
                }
            }
            (Accumulator::Last(expr), AccumulatorState::Last(last)) => {
                *last = expr.resolve(doc).cloned().unwrap_or(Bson::Null);
            }
            (Accumulator::Count, AccumulatorState::Count(n)) => {
                *n += 1;
            }
            // States are created by initial_state() of the same accumulator
            _ => {}
        }
    }
}

impl AccumulatorState {
    fn finalize(self) -> Bson {
        match self {
            AccumulatorState::Sum {
                int_total,
                float_total,
                has_float,
            } => {
                if has_float {
                    Bson::Double(float_total + int_total as f64)
                } else {
                    int_to_bson(int_total)
                }
            }
            AccumulatorState::Avg { total, count } => {
                if count > 0 {
                    Bson::Double(total / count as f64)
                } else {
                    Bson::Null
                }
            }
            AccumulatorState::Extremum { best, .. } => best.unwrap_or(Bson::Null),
            AccumulatorState::First(first) => first.unwrap_or(Bson::Null),
            AccumulatorState::Last(last) => last,
            AccumulatorState::Count(n) => int_to_bson(n),
        }
    }
}

/// Accumulator operand: a `$field` path or a scalar literal
///
/// `{"$sum": 1}` counts; a non-numeric literal such as `{"$sum": "abc"}` adds 0.
fn parse_operand(value: &Bson, op_name: &str) -> Result<Expression> {
    let expr = Expression::from_bson(value)?;
    if let Expression::Literal(Bson::Document(_) | Bson::Array(_)) = &expr {
        return Err(PipeliteError::AggregationError(format!(
            "{} must be a field reference or scalar, got {}",
            op_name, value
        )));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn group(spec: Document) -> GroupStage {
        GroupStage::from_bson(&Bson::Document(spec)).unwrap()
    }

    fn expenses() -> Vec<Document> {
        vec![
            doc! {"category": "Entertainment", "amount": 149, "mode": "Axis CC"},
            doc! {"category": "Food", "amount": 300, "mode": "Cash"},
            doc! {"category": "Beverages", "amount": 10, "mode": "UPI"},
            doc! {"category": "Food", "amount": 125, "mode": "Credit Card"},
            doc! {"category": "Travel", "amount": 6400, "mode": "UPI"},
        ]
    }

    #[test]
    fn test_group_sum_in_first_seen_order() {
        let stage = group(doc! {"_id": "$category", "totalAmount": {"$sum": "$amount"}});
        let results = stage.execute(expenses());
        assert_eq!(
            results,
            vec![
                doc! {"_id": "Entertainment", "totalAmount": 149},
                doc! {"_id": "Food", "totalAmount": 425},
                doc! {"_id": "Beverages", "totalAmount": 10},
                doc! {"_id": "Travel", "totalAmount": 6400},
            ]
        );
    }

    #[test]
    fn test_group_null_id() {
        let docs = vec![doc! {"value": 10}, doc! {"value": 20}, doc! {"value": 30}];
        let stage = group(doc! {"_id": Bson::Null, "total": {"$sum": "$value"}});
        let results = stage.execute(docs);
        assert_eq!(results, vec![doc! {"_id": Bson::Null, "total": 60}]);
    }

    #[test]
    fn test_group_output_field_order_follows_declaration() {
        let stage = group(doc! {
            "_id": "$category",
            "n": {"$count": {}},
            "total": {"$sum": "$amount"},
            "avg": {"$avg": "$amount"},
        });
        let results = stage.execute(expenses());
        let keys: Vec<&str> = results[0].keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["_id", "n", "total", "avg"]);
    }

    #[test]
    fn test_group_missing_key_groups_under_null() {
        let docs = vec![doc! {"city": "NYC"}, doc! {}, doc! {"city": Bson::Null}];
        let stage = group(doc! {"_id": "$city", "count": {"$sum": 1}});
        let results = stage.execute(docs);
        assert_eq!(
            results,
            vec![
                doc! {"_id": "NYC", "count": 1},
                doc! {"_id": Bson::Null, "count": 2},
            ]
        );
    }

    #[test]
    fn test_group_numeric_keys_compare_by_value() {
        let docs = vec![doc! {"k": 1}, doc! {"k": 1.0}, doc! {"k": 1_i64}, doc! {"k": "1"}];
        let stage = group(doc! {"_id": "$k", "n": {"$count": {}}});
        let results = stage.execute(docs);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], doc! {"_id": 1, "n": 3});
        assert_eq!(results[1], doc! {"_id": "1", "n": 1});
    }

    #[test]
    fn test_group_wide_int_and_rounded_double_stay_apart() {
        let docs = vec![
            doc! {"k": 9_007_199_254_740_993_i64},
            doc! {"k": 9_007_199_254_740_992.0},
            doc! {"k": 9_007_199_254_740_992_i64},
        ];
        let stage = group(doc! {"_id": "$k", "n": {"$count": {}}});
        let results = stage.execute(docs);
        assert_eq!(
            results,
            vec![
                doc! {"_id": 9_007_199_254_740_993_i64, "n": 1},
                doc! {"_id": 9_007_199_254_740_992.0, "n": 2},
            ]
        );
    }

    #[test]
    fn test_group_compound_key() {
        let stage = group(doc! {
            "_id": {"category": "$category", "mode": "$mode"},
            "total": {"$sum": "$amount"},
        });
        let docs = vec![
            doc! {"category": "Food", "mode": "Cash", "amount": 1},
            doc! {"category": "Food", "mode": "UPI", "amount": 2},
            doc! {"category": "Food", "mode": "Cash", "amount": 3},
        ];
        let results = stage.execute(docs);
        assert_eq!(
            results,
            vec![
                doc! {"_id": {"category": "Food", "mode": "Cash"}, "total": 4},
                doc! {"_id": {"category": "Food", "mode": "UPI"}, "total": 2},
            ]
        );
    }

    #[test]
    fn test_sum_treats_non_numeric_as_zero() {
        let docs = vec![doc! {"v": 5}, doc! {"v": "five"}, doc! {}, doc! {"v": Bson::Null}];
        let stage = group(doc! {"_id": Bson::Null, "total": {"$sum": "$v"}});
        assert_eq!(stage.execute(docs)[0].get("total"), Some(&Bson::Int32(5)));
    }

    #[test]
    fn test_sum_float_and_wide_ints() {
        let docs = vec![doc! {"value": 1.5}, doc! {"value": 2.5}, doc! {"value": 1}];
        let stage = group(doc! {"_id": Bson::Null, "sum": {"$sum": "$value"}});
        assert_eq!(stage.execute(docs)[0].get("sum"), Some(&Bson::Double(5.0)));

        let docs = vec![doc! {"value": i32::MAX}, doc! {"value": 1}];
        let stage = group(doc! {"_id": Bson::Null, "sum": {"$sum": "$value"}});
        assert_eq!(
            stage.execute(docs)[0].get("sum"),
            Some(&Bson::Int64(i64::from(i32::MAX) + 1))
        );
    }

    #[test]
    fn test_sum_overflow_switches_to_double() {
        let docs = vec![
            doc! {"value": i64::MAX},
            doc! {"value": 10_i64},
            doc! {"value": -10_i64},
        ];
        let stage = group(doc! {"_id": Bson::Null, "sum": {"$sum": "$value"}});
        assert_eq!(
            stage.execute(docs)[0].get("sum"),
            Some(&Bson::Double(i64::MAX as f64))
        );

        let docs = vec![doc! {"value": i64::MIN}, doc! {"value": -1_i64}, doc! {"value": 1_i64}];
        let stage = group(doc! {"_id": Bson::Null, "sum": {"$sum": "$value"}});
        assert_eq!(
            stage.execute(docs)[0].get("sum"),
            Some(&Bson::Double(i64::MIN as f64))
        );
    }

    #[test]
    fn test_sum_non_numeric_literal_adds_zero() {
        let docs = vec![doc! {"v": 1}, doc! {"v": 2}];
        let stage = group(doc! {
            "_id": Bson::Null,
            "text": {"$sum": "abc"},
            "avg": {"$avg": "abc"},
        });
        assert_eq!(
            stage.execute(docs),
            vec![doc! {"_id": Bson::Null, "text": 0, "avg": Bson::Null}]
        );
    }

    #[test]
    fn test_accumulator_avg() {
        let docs = vec![doc! {"value": 10}, doc! {"value": 20}, doc! {"value": 30}, doc! {}];
        let stage = group(doc! {"_id": Bson::Null, "avg": {"$avg": "$value"}});
        assert_eq!(stage.execute(docs)[0].get("avg"), Some(&Bson::Double(20.0)));
    }

    #[test]
    fn test_accumulator_avg_empty() {
        let stage = group(doc! {"_id": Bson::Null, "avg": {"$avg": "$value"}});
        assert_eq!(stage.execute(vec![doc! {}])[0].get("avg"), Some(&Bson::Null));
    }

    #[test]
    fn test_accumulator_min_max() {
        let docs = vec![doc! {"value": 30}, doc! {"value": 10}, doc! {}, doc! {"value": 20}];
        let stage = group(doc! {
            "_id": Bson::Null,
            "min": {"$min": "$value"},
            "max": {"$max": "$value"},
        });
        let results = stage.execute(docs);
        assert_eq!(results[0], doc! {"_id": Bson::Null, "min": 10, "max": 30});
    }

    #[test]
    fn test_accumulator_min_max_dates() {
        let early = bson::DateTime::from_millis(1_000);
        let late = bson::DateTime::from_millis(9_000);
        let docs = vec![doc! {"at": late}, doc! {"at": early}];
        let stage = group(doc! {
            "_id": Bson::Null,
            "first": {"$min": "$at"},
            "last": {"$max": "$at"},
        });
        assert_eq!(
            stage.execute(docs)[0],
            doc! {"_id": Bson::Null, "first": early, "last": late}
        );
    }

    #[test]
    fn test_accumulator_min_max_empty() {
        let stage = group(doc! {
            "_id": Bson::Null,
            "min": {"$min": "$value"},
            "max": {"$max": "$value"},
        });
        let results = stage.execute(vec![doc! {}]);
        assert_eq!(results[0], doc! {"_id": Bson::Null, "min": Bson::Null, "max": Bson::Null});
    }

    #[test]
    fn test_accumulator_first_last() {
        let docs = vec![
            doc! {"value": "first"},
            doc! {"value": "middle"},
            doc! {"value": "last"},
        ];
        let stage = group(doc! {
            "_id": Bson::Null,
            "first": {"$first": "$value"},
            "last": {"$last": "$value"},
        });
        let results = stage.execute(docs);
        assert_eq!(results[0], doc! {"_id": Bson::Null, "first": "first", "last": "last"});
    }

    #[test]
    fn test_count_ignores_values() {
        let docs = vec![doc! {"a": 1}, doc! {}, doc! {"a": "x"}];
        let stage = group(doc! {"_id": Bson::Null, "n": {"$count": {}}});
        assert_eq!(stage.execute(docs)[0].get("n"), Some(&Bson::Int32(3)));
    }

    #[test]
    fn test_empty_input_emits_no_groups() {
        let stage = group(doc! {"_id": "$category", "n": {"$sum": 1}});
        assert!(stage.execute(Vec::new()).is_empty());
    }

    #[test]
    fn test_group_missing_id() {
        let err = GroupStage::from_bson(&Bson::Document(doc! {"count": {"$sum": 1}})).unwrap_err();
        assert!(err.to_string().contains("must have _id field"));
    }

    #[test]
    fn test_group_not_object() {
        let err = GroupStage::from_bson(&Bson::String("invalid".into())).unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn test_group_id_operator_rejected() {
        let spec = doc! {"_id": {"$toUpper": "$category"}};
        let err = GroupStage::from_bson(&Bson::Document(spec)).unwrap_err();
        assert!(err.to_string().contains("Unknown group _id operator"));
    }

    #[test]
    fn test_group_invalid_output_field() {
        let spec = doc! {"_id": Bson::Null, "a.b": {"$sum": 1}};
        assert!(GroupStage::from_bson(&Bson::Document(spec)).is_err());
    }

    #[test]
    fn test_accumulator_parse_errors() {
        let cases = [
            (Bson::String("invalid".into()), "must be an object"),
            (Bson::Document(doc! {"$sum": 1, "$avg": "$a"}), "exactly one operator"),
            (Bson::Document(doc! {"$unknown": "$field"}), "Unknown accumulator"),
            (Bson::Document(doc! {"$sum": [1, 2]}), "field reference or scalar"),
            (Bson::Document(doc! {"$max": {"a": 1}}), "field reference or scalar"),
            (Bson::Document(doc! {"$count": 1}), "$count takes an empty document, got 1"),
        ];
        for (spec, message) in cases {
            let err = Accumulator::from_bson(&spec).unwrap_err();
            assert!(err.to_string().contains(message), "{} -> {}", spec, err);
        }
    }

    #[test]
    fn test_accumulator_literal_operands() {
        assert_eq!(
            Accumulator::from_bson(&Bson::Document(doc! {"$sum": 1})).unwrap(),
            Accumulator::Sum(Expression::Literal(Bson::Int32(1)))
        );
        assert_eq!(
            Accumulator::from_bson(&Bson::Document(doc! {"$first": "label"})).unwrap(),
            Accumulator::First(Expression::Literal(Bson::String("label".into())))
        );
    }
}
