// src/aggregation/match_stage.rs
// $match stage - stable filter over a compiled predicate

use bson::{Bson, Document};

use crate::error::Result;
use crate::query::Predicate;

/// $match stage - filter documents
#[derive(Debug, Clone)]
pub struct MatchStage {
    predicate: Predicate,
}

impl MatchStage {
    pub fn new(predicate: Predicate) -> Self {
        MatchStage { predicate }
    }

    pub(crate) fn from_bson(spec: &Bson) -> Result<Self> {
        Ok(MatchStage {
            predicate: Predicate::from_bson(spec)?,
        })
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Keep the documents that satisfy the predicate, in input order
    pub fn execute(&self, docs: Vec<Document>) -> Vec<Document> {
        docs.into_iter()
            .filter(|doc| self.predicate.matches(doc))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn amounts(docs: &[Document]) -> Vec<i32> {
        docs.iter().map(|d| d.get_i32("amount").unwrap()).collect()
    }

    #[test]
    fn test_match_is_stable_filter() {
        let docs = vec![
            doc! {"amount": 149},
            doc! {"amount": 6400},
            doc! {"amount": 10},
            doc! {"amount": 1024},
            doc! {"amount": 1000},
        ];
        let stage = MatchStage::from_bson(&Bson::Document(doc! {"amount": {"$gt": 1000}})).unwrap();
        assert_eq!(amounts(&stage.execute(docs)), vec![6400, 1024]);
    }

    #[test]
    fn test_match_returns_documents_unchanged() {
        let docs = vec![doc! {"title": "Tea", "amount": 10, "mode": "UPI"}];
        let stage = MatchStage::from_bson(&Bson::Document(doc! {"mode": "UPI"})).unwrap();
        assert_eq!(stage.execute(docs.clone()), docs);
    }

    #[test]
    fn test_match_spec_must_be_document() {
        let err = MatchStage::from_bson(&Bson::String("amount".into())).unwrap_err();
        assert!(err.to_string().contains("must be a document"));
    }
}
