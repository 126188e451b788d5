// src/aggregation/mod.rs
// Aggregation pipeline: stage parsing, dispatch and execution

mod group;
mod match_stage;
mod project;
mod sort;

pub use group::{Accumulator, GroupId, GroupStage};
pub use match_stage::MatchStage;
pub use project::{ProjectField, ProjectMode, ProjectStage};
pub use sort::{LimitStage, SkipStage, SortDirection, SortStage};

use bson::{Bson, Document};
use serde_json::Value;

use crate::document::from_json_value;
use crate::error::{PipeliteError, Result};
use crate::options::AggregateOptions;
use crate::storage::DocumentSource;
use crate::{log_debug, log_trace};

/// Aggregation pipeline
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
    options: AggregateOptions,
}

/// Pipeline stage
#[derive(Debug, Clone)]
pub enum Stage {
    Match(MatchStage),
    Project(ProjectStage),
    Group(GroupStage),
    Sort(SortStage),
    Limit(LimitStage),
    Skip(SkipStage),
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Pipeline {
            stages,
            options: AggregateOptions::default(),
        }
    }

    /// Build a pipeline from stage documents
    ///
    /// An empty slice is a valid (identity) pipeline.
    pub fn from_documents(stage_docs: &[Document]) -> Result<Self> {
        let stages = stage_docs
            .iter()
            .map(Stage::from_document)
            .collect::<Result<Vec<_>>>()?;
        Ok(Pipeline::new(stages))
    }

    /// Create pipeline from a JSON array (extended JSON allowed in literals)
    pub fn from_json(pipeline_json: &Value) -> Result<Self> {
        let stages_array = match pipeline_json {
            Value::Array(stages_array) => stages_array,
            _ => {
                return Err(PipeliteError::AggregationError(
                    "Pipeline must be an array".to_string(),
                ))
            }
        };

        let mut stages = Vec::with_capacity(stages_array.len());
        for stage_json in stages_array {
            match from_json_value(stage_json)? {
                Bson::Document(stage_doc) => stages.push(Stage::from_document(&stage_doc)?),
                _ => {
                    return Err(PipeliteError::AggregationError(
                        "Stage must be an object".to_string(),
                    ))
                }
            }
        }

        Ok(Pipeline::new(stages))
    }

    pub fn with_options(mut self, options: AggregateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn options(&self) -> &AggregateOptions {
        &self.options
    }

    /// Execute pipeline on documents
    ///
    /// Each stage consumes the previous stage's output in full. With no
    /// stages the input comes back unchanged.
    pub fn execute(&self, docs: Vec<Document>) -> Result<Vec<Document>> {
        execute_stages(&self.stages, docs, &self.options)
    }

    /// Materialise `collection` from `source` and run the pipeline over it
    pub fn run<S: DocumentSource + ?Sized>(&self, source: &S, collection: &str) -> Result<Vec<Document>> {
        let docs = source.fetch_all(collection)?;
        self.execute(docs)
    }
}

impl Stage {
    /// Parse one stage document such as `{"$match": {...}}`
    pub fn from_document(stage_doc: &Document) -> Result<Self> {
        // Each stage should have exactly one key
        if stage_doc.len() != 1 {
            return Err(PipeliteError::AggregationError(
                "Each stage must have exactly one operator".to_string(),
            ));
        }

        let (stage_name, stage_spec) = match stage_doc.iter().next() {
            Some(entry) => entry,
            None => {
                return Err(PipeliteError::AggregationError(
                    "Each stage must have exactly one operator".to_string(),
                ))
            }
        };

        match stage_name.as_str() {
            "$match" => Ok(Stage::Match(MatchStage::from_bson(stage_spec)?)),
            "$project" => Ok(Stage::Project(ProjectStage::from_bson(stage_spec)?)),
            "$group" => Ok(Stage::Group(GroupStage::from_bson(stage_spec)?)),
            "$sort" => Ok(Stage::Sort(SortStage::from_bson(stage_spec)?)),
            "$limit" => Ok(Stage::Limit(LimitStage::from_bson(stage_spec)?)),
            "$skip" => Ok(Stage::Skip(SkipStage::from_bson(stage_spec)?)),
            _ => Err(PipeliteError::AggregationError(format!(
                "Unknown pipeline stage: {}",
                stage_name
            ))),
        }
    }

    /// Stage tag as written in a pipeline (`"$match"`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "$match",
            Stage::Project(_) => "$project",
            Stage::Group(_) => "$group",
            Stage::Sort(_) => "$sort",
            Stage::Limit(_) => "$limit",
            Stage::Skip(_) => "$skip",
        }
    }

    /// Execute this stage
    pub fn execute(&self, docs: Vec<Document>, options: &AggregateOptions) -> Result<Vec<Document>> {
        let out = match self {
            Stage::Match(stage) => stage.execute(docs),
            Stage::Project(stage) => stage.execute(docs, options.missing_field_policy),
            Stage::Group(stage) => stage.execute(docs),
            Stage::Sort(stage) => stage.execute(docs),
            Stage::Limit(stage) => stage.execute(docs),
            Stage::Skip(stage) => stage.execute(docs),
        };
        Ok(out)
    }
}

fn execute_stages(
    stages: &[Stage],
    mut docs: Vec<Document>,
    options: &AggregateOptions,
) -> Result<Vec<Document>> {
    options.check_document_count(docs.len())?;
    log_debug!("Running {} stage(s) over {} document(s)", stages.len(), docs.len());

    for stage in stages {
        docs = stage.execute(docs, options)?;
        log_trace!("{} produced {} document(s)", stage.name(), docs.len());
    }
    Ok(docs)
}

/// Run `stages` over the named collection of `source`
///
/// An empty stage list returns the collection as stored.
pub fn aggregate<S: DocumentSource + ?Sized>(
    stages: &[Stage],
    source: &S,
    collection: &str,
) -> Result<Vec<Document>> {
    aggregate_with_options(stages, source, collection, &AggregateOptions::default())
}

/// [`aggregate`] with explicit options
pub fn aggregate_with_options<S: DocumentSource + ?Sized>(
    stages: &[Stage],
    source: &S,
    collection: &str,
    options: &AggregateOptions,
) -> Result<Vec<Document>> {
    let docs = source.fetch_all(collection)?;
    execute_stages(stages, docs, options)
}
