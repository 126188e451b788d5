// pipelite-core/src/lib.rs
// In-process aggregation pipelines over BSON documents

pub mod aggregation;
pub mod document;
pub mod error;
pub mod expression;
pub mod logging;
pub mod options;
pub mod query;
pub mod storage;
pub mod value_utils;

// Public exports
pub use aggregation::{aggregate, aggregate_with_options, Pipeline, Stage};
pub use error::{PipeliteError, Result};
pub use expression::Expression;
pub use logging::{get_log_level, set_log_level, LogLevel};
pub use options::{AggregateOptions, MissingFieldPolicy};
pub use query::Predicate;
pub use storage::{DocumentSource, MemoryStorage};

pub use bson;
