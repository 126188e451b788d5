// src/aggregation/project.rs
// $project stage - inclusion, exclusion and computed fields

use bson::{Bson, Document};

use crate::error::{PipeliteError, Result};
use crate::expression::Expression;
use crate::options::MissingFieldPolicy;
use crate::value_utils::{as_f64, get_nested_value, remove_nested_value, set_nested_value};

/// $project stage - reshape documents
#[derive(Debug, Clone)]
pub struct ProjectStage {
    /// Declared fields in declaration order (`_id` kept separately)
    fields: Vec<(String, ProjectField)>,
    id: Option<ProjectField>,
    mode: ProjectMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectField {
    Include,
    Exclude,
    Computed(Expression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectMode {
    Inclusion,
    Exclusion,
}

impl ProjectField {
    /// `1`/`true` include, `0`/`false` exclude; anything else is an
    /// expression (a `$path`, `{$literal: v}` or a plain literal value)
    fn from_bson(value: &Bson) -> Result<Self> {
        match value {
            Bson::Boolean(true) => Ok(ProjectField::Include),
            Bson::Boolean(false) => Ok(ProjectField::Exclude),
            Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => match as_f64(value) {
                Some(n) if n == 1.0 => Ok(ProjectField::Include),
                Some(n) if n == 0.0 => Ok(ProjectField::Exclude),
                _ => Ok(ProjectField::Computed(Expression::Literal(value.clone()))),
            },
            Bson::Document(doc) if doc.len() == 1 && doc.contains_key("$literal") => {
                Ok(ProjectField::Computed(Expression::from_bson(value)?))
            }
            Bson::Document(_) => Err(PipeliteError::AggregationError(
                "Invalid project expression".to_string(),
            )),
            other => Ok(ProjectField::Computed(Expression::from_bson(other)?)),
        }
    }
}

impl ProjectStage {
    pub(crate) fn from_bson(spec: &Bson) -> Result<Self> {
        let obj = match spec {
            Bson::Document(obj) => obj,
            _ => {
                return Err(PipeliteError::AggregationError(
                    "$project must be an object".to_string(),
                ))
            }
        };
        if obj.is_empty() {
            return Err(PipeliteError::AggregationError(
                "$project must specify at least one field".to_string(),
            ));
        }

        let mut fields = Vec::with_capacity(obj.len());
        let mut id = None;
        for (name, value) in obj {
            if name.is_empty() || name.starts_with('$') || name.split('.').any(str::is_empty) {
                return Err(PipeliteError::AggregationError(format!(
                    "Invalid project field name: {}",
                    name
                )));
            }
            let field = ProjectField::from_bson(value)?;
            if name == "_id" {
                id = Some(field);
            } else {
                fields.push((name.clone(), field));
            }
        }

        let excludes = fields
            .iter()
            .filter(|(_, f)| *f == ProjectField::Exclude)
            .count();
        let mode = if excludes == 0 {
            // `{_id: 0}` alone excludes _id and keeps everything else
            if fields.is_empty() && id == Some(ProjectField::Exclude) {
                ProjectMode::Exclusion
            } else {
                ProjectMode::Inclusion
            }
        } else if excludes == fields.len() {
            if matches!(id, Some(ProjectField::Computed(_))) {
                return Err(PipeliteError::AggregationError(
                    "Cannot compute _id in an exclusion projection".to_string(),
                ));
            }
            ProjectMode::Exclusion
        } else {
            return Err(PipeliteError::AggregationError(
                "Cannot mix inclusion and exclusion in $project".to_string(),
            ));
        };

        Ok(ProjectStage { fields, id, mode })
    }

    pub fn mode(&self) -> ProjectMode {
        self.mode
    }

    pub fn execute(&self, docs: Vec<Document>, policy: MissingFieldPolicy) -> Vec<Document> {
        match self.mode {
            ProjectMode::Inclusion => docs
                .iter()
                .map(|doc| self.project_inclusive(doc, policy))
                .collect(),
            ProjectMode::Exclusion => docs
                .into_iter()
                .map(|doc| self.project_exclusive(doc))
                .collect(),
        }
    }

    fn project_inclusive(&self, doc: &Document, policy: MissingFieldPolicy) -> Document {
        let mut result = Document::new();

        match &self.id {
            Some(ProjectField::Exclude) => {}
            Some(ProjectField::Computed(expr)) => {
                write_field(&mut result, "_id", expr.resolve(doc), policy);
            }
            Some(ProjectField::Include) | None => {
                if let Some(id) = doc.get("_id") {
                    result.insert("_id", id.clone());
                }
            }
        }

        for (name, field) in &self.fields {
            let value = match field {
                ProjectField::Include => get_nested_value(doc, name),
                ProjectField::Computed(expr) => expr.resolve(doc),
                ProjectField::Exclude => continue,
            };
            write_field(&mut result, name, value, policy);
        }

        result
    }

    fn project_exclusive(&self, mut doc: Document) -> Document {
        if self.id == Some(ProjectField::Exclude) {
            doc.remove("_id");
        }
        for (name, _) in &self.fields {
            remove_nested_value(&mut doc, name);
        }
        doc
    }
}

fn write_field(result: &mut Document, name: &str, value: Option<&Bson>, policy: MissingFieldPolicy) {
    match (value, policy) {
        (Some(value), _) => set_nested_value(result, name, value.clone()),
        (None, MissingFieldPolicy::Null) => set_nested_value(result, name, Bson::Null),
        (None, MissingFieldPolicy::Omit) => {}
    }
}
