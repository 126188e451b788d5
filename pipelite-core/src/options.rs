// pipelite-core/src/options.rs
// Aggregation options: projection shape policy and materialisation cap

use serde::{Deserialize, Serialize};

use crate::error::{PipeliteError, Result};

/// What `$project` writes when an included field is absent from the source
///
/// The default, `Null`, gives every output document of an inclusion
/// projection the same keys in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    /// Write an explicit null
    #[default]
    Null,
    /// Leave the key out of that output document
    Omit,
}

/// Options for a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregateOptions {
    /// Inclusion-mode `$project` behaviour for absent source fields
    pub missing_field_policy: MissingFieldPolicy,

    /// Maximum number of documents a run may start from
    pub max_documents: Option<usize>,
}

impl AggregateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_missing_field_policy(mut self, policy: MissingFieldPolicy) -> Self {
        self.missing_field_policy = policy;
        self
    }

    pub fn with_max_documents(mut self, max_documents: usize) -> Self {
        self.max_documents = Some(max_documents);
        self
    }

    /// Parse options from a JSON config string
    ///
    /// Unknown keys are rejected; missing keys take their defaults.
    /// Malformed JSON is a `Serialization` error, bad options a `Config` error.
    ///
    /// ```
    /// use pipelite_core::{AggregateOptions, MissingFieldPolicy};
    ///
    /// let options = AggregateOptions::from_json_str(r#"{"missing_field_policy": "omit"}"#).unwrap();
    /// assert_eq!(options.missing_field_policy, MissingFieldPolicy::Omit);
    /// assert_eq!(options.max_documents, None);
    /// ```
    pub fn from_json_str(config: &str) -> Result<Self> {
        serde_json::from_str(config).map_err(|e| {
            if e.is_syntax() || e.is_eof() {
                PipeliteError::from(e)
            } else {
                PipeliteError::Config(e.to_string())
            }
        })
    }

    /// Fail when a run would start from more documents than allowed
    pub(crate) fn check_document_count(&self, count: usize) -> Result<()> {
        match self.max_documents {
            Some(max) if count > max => Err(PipeliteError::AggregationError(format!(
                "Pipeline input has {} documents, limit is {}",
                count, max
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = AggregateOptions::new();
        assert_eq!(options.missing_field_policy, MissingFieldPolicy::Null);
        assert_eq!(options.max_documents, None);
        assert!(options.check_document_count(usize::MAX).is_ok());
    }

    #[test]
    fn test_builder() {
        let options = AggregateOptions::new()
            .with_missing_field_policy(MissingFieldPolicy::Omit)
            .with_max_documents(10);
        assert_eq!(options.missing_field_policy, MissingFieldPolicy::Omit);
        assert!(options.check_document_count(10).is_ok());
        let err = options.check_document_count(11).unwrap_err();
        assert!(err.to_string().contains("limit is 10"));
    }

    #[test]
    fn test_from_json_str() {
        let options =
            AggregateOptions::from_json_str(r#"{"max_documents": 500, "missing_field_policy": "omit"}"#)
                .unwrap();
        assert_eq!(options.max_documents, Some(500));
        assert_eq!(options.missing_field_policy, MissingFieldPolicy::Omit);

        assert_eq!(AggregateOptions::from_json_str("{}").unwrap(), AggregateOptions::default());
    }

    #[test]
    fn test_from_json_str_errors() {
        match AggregateOptions::from_json_str(r#"{"max_documents": 5, "strict": true}"#) {
            Err(PipeliteError::Config(msg)) => assert!(msg.contains("unknown field `strict`"), "{}", msg),
            other => panic!("Expected Config error, got {:?}", other),
        }
        assert!(matches!(
            AggregateOptions::from_json_str(r#"{"max_documents": -1}"#),
            Err(PipeliteError::Config(_))
        ));
        assert!(matches!(
            AggregateOptions::from_json_str(r#"{"missing_field_policy": "drop"}"#),
            Err(PipeliteError::Config(_))
        ));
        assert!(matches!(
            AggregateOptions::from_json_str("not json"),
            Err(PipeliteError::Serialization(_))
        ));
        assert!(matches!(
            AggregateOptions::from_json_str(r#"{"max_documents": 5"#),
            Err(PipeliteError::Serialization(_))
        ));
    }
}
