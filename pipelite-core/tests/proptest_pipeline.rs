//! Property-based tests for pipeline stage invariants.
//!
//! These hold for any input collection, not just the fixture: filtering is an
//! order-preserving subset, grouping conserves totals and first-seen order,
//! exclusion projection removes exactly the named fields.

use bson::{doc, Bson, Document};
use proptest::prelude::*;
use std::collections::HashSet;

use pipelite_core::{Pipeline, Stage};

// ============================================================================
// Test Strategies
// ============================================================================

fn category_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["Food", "Travel", "Education", "Transport"]).prop_map(String::from)
}

/// Expense-like document; `mode` is sometimes absent
fn expense_strategy() -> impl Strategy<Value = Document> {
    (
        category_strategy(),
        0i32..10_000,
        prop::option::of(prop::sample::select(vec!["UPI", "Cash", "Credit Card"])),
    )
        .prop_map(|(category, amount, mode)| {
            let mut doc = doc! {"category": category, "amount": amount};
            if let Some(mode) = mode {
                doc.insert("mode", mode);
            }
            doc
        })
}

fn expenses_strategy() -> impl Strategy<Value = Vec<Document>> {
    prop::collection::vec(expense_strategy(), 0..60).prop_map(|docs| {
        docs.into_iter()
            .enumerate()
            .map(|(i, doc)| {
                let mut with_id = doc! {"_id": i as i32};
                with_id.extend(doc);
                with_id
            })
            .collect()
    })
}

fn run(stages: Vec<Document>, docs: Vec<Document>) -> Vec<Document> {
    Pipeline::from_documents(&stages)
        .unwrap()
        .execute(docs)
        .unwrap()
}

fn ids(docs: &[Document]) -> Vec<i32> {
    docs.iter().map(|d| d.get_i32("_id").unwrap()).collect()
}

// ============================================================================
// Stage Property Tests
// ============================================================================

proptest! {
    /// $match output is a subsequence of its input.
    #[test]
    fn prop_match_is_order_preserving_subset(
        docs in expenses_strategy(),
        threshold in 0i32..10_000,
    ) {
        let out = run(vec![doc! {"$match": {"amount": {"$gt": threshold}}}], docs.clone());
        let expected: Vec<i32> = docs
            .iter()
            .filter(|d| d.get_i32("amount").unwrap() > threshold)
            .map(|d| d.get_i32("_id").unwrap())
            .collect();
        prop_assert_eq!(ids(&out), expected);
    }

    /// Two consecutive $match stages equal one $match on both fields.
    #[test]
    fn prop_match_composes(
        docs in expenses_strategy(),
        threshold in 0i32..10_000,
        category in category_strategy(),
    ) {
        let chained = run(
            vec![
                doc! {"$match": {"amount": {"$gte": threshold}}},
                doc! {"$match": {"category": category.clone()}},
            ],
            docs.clone(),
        );
        let combined = run(
            vec![doc! {"$match": {"amount": {"$gte": threshold}, "category": category}}],
            docs,
        );
        prop_assert_eq!(chained, combined);
    }

    /// Two range bounds on the same field compose like one combined bound.
    #[test]
    fn prop_match_composes_on_same_field(
        docs in expenses_strategy(),
        low in 0i32..10_000,
        high in 0i32..10_000,
    ) {
        let chained = run(
            vec![
                doc! {"$match": {"amount": {"$gte": low}}},
                doc! {"$match": {"amount": {"$lt": high}}},
            ],
            docs.clone(),
        );
        let combined = run(
            vec![doc! {"$match": {"amount": {"$gte": low, "$lt": high}}}],
            docs.clone(),
        );
        let expected: Vec<i32> = docs
            .iter()
            .filter(|d| {
                let amount = d.get_i32("amount").unwrap();
                amount >= low && amount < high
            })
            .map(|d| d.get_i32("_id").unwrap())
            .collect();
        prop_assert_eq!(ids(&chained), expected);
        prop_assert_eq!(chained, combined);
    }

    /// Group totals add up to the input total.
    #[test]
    fn prop_group_sum_conserves_total(docs in expenses_strategy()) {
        let total: i64 = docs.iter().map(|d| i64::from(d.get_i32("amount").unwrap())).sum();
        let groups = run(
            vec![doc! {"$group": {"_id": "$category", "t": {"$sum": "$amount"}}}],
            docs,
        );
        let grouped: i64 = groups
            .iter()
            .map(|g| match g.get("t") {
                Some(Bson::Int32(n)) => i64::from(*n),
                Some(Bson::Int64(n)) => *n,
                other => panic!("unexpected total {:?}", other),
            })
            .sum();
        prop_assert_eq!(grouped, total);
    }

    /// Groups come out in first-occurrence order with unique keys.
    #[test]
    fn prop_group_first_seen_order(docs in expenses_strategy()) {
        let mut seen = Vec::new();
        for doc in &docs {
            let key = doc.get("mode").cloned().unwrap_or(Bson::Null);
            if !seen.contains(&key) {
                seen.push(key);
            }
        }
        let groups = run(
            vec![doc! {"$group": {"_id": "$mode", "n": {"$count": {}}}}],
            docs,
        );
        let keys: Vec<Bson> = groups.iter().map(|g| g.get("_id").cloned().unwrap()).collect();
        prop_assert_eq!(keys, seen);
    }

    /// Exclusion output keys are the source keys minus the excluded names.
    #[test]
    fn prop_exclusion_field_set(docs in expenses_strategy()) {
        let out = run(vec![doc! {"$project": {"mode": 0, "amount": 0}}], docs.clone());
        prop_assert_eq!(out.len(), docs.len());
        for (projected, source) in out.iter().zip(&docs) {
            let expected: HashSet<&String> = source
                .keys()
                .filter(|k| k.as_str() != "mode" && k.as_str() != "amount")
                .collect();
            let actual: HashSet<&String> = projected.keys().collect();
            prop_assert_eq!(actual, expected);
        }
    }

    /// Inclusion emits exactly the declared fields, null where the source lacks one.
    #[test]
    fn prop_inclusion_only_declared_fields(docs in expenses_strategy()) {
        let out = run(vec![doc! {"$project": {"mode": 1, "label": "$category"}}], docs.clone());
        for (projected, source) in out.iter().zip(&docs) {
            let keys: Vec<&str> = projected.keys().map(|k| k.as_str()).collect();
            prop_assert_eq!(keys, vec!["_id", "mode", "label"]);
            let expected_mode = source.get("mode").cloned().unwrap_or(Bson::Null);
            prop_assert_eq!(projected.get("mode"), Some(&expected_mode));
        }
    }

    /// $sort is stable and leaves the multiset of documents unchanged.
    #[test]
    fn prop_sort_is_stable_permutation(docs in expenses_strategy()) {
        let stage = Stage::from_document(&doc! {"$sort": {"category": 1}}).unwrap();
        let pipeline = Pipeline::new(vec![stage]);
        let sorted = pipeline.execute(docs.clone()).unwrap();

        let mut expected = docs;
        expected.sort_by(|a, b| a.get_str("category").unwrap().cmp(b.get_str("category").unwrap()));
        prop_assert_eq!(ids(&sorted), ids(&expected));
    }
}
