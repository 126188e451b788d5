// src/error.rs
// Error types shared by the pipeline engine and the document stores

use thiserror::Error;

/// Pipelite error
///
/// Shape problems (malformed stages, predicates, projections) are reported
/// eagerly when a pipeline is built. Data problems (missing fields, values of
/// the wrong kind) never surface here: they resolve to absent or to a
/// non-matching predicate.
#[derive(Error, Debug)]
pub enum PipeliteError {
    /// Malformed stage, accumulator or projection
    #[error("Aggregation error: {0}")]
    AggregationError(String),

    /// Malformed `$match` predicate
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    /// Extended JSON that does not describe a document
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for PipeliteError {
    fn from(err: serde_json::Error) -> Self {
        PipeliteError::Serialization(err.to_string())
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, PipeliteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = PipeliteError::CollectionNotFound("Expense".to_string());
        assert_eq!(err.to_string(), "Collection not found: Expense");

        let err = PipeliteError::AggregationError("Unknown pipeline stage: $out".to_string());
        assert!(err.to_string().contains("Unknown pipeline stage"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: PipeliteError = json_err.into();
        assert!(matches!(err, PipeliteError::Serialization(_)));
    }
}
