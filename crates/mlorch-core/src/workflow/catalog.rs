//! Workflow catalog parsing and load-time validation.
//!
//! A catalog is loaded once at startup (from YAML or the built-in default)
//! and is immutable afterwards. Everything that can be checked statically is
//! checked here so that the executor never meets a malformed definition.

use std::collections::{HashMap, HashSet};

use mlorch_types::request::OrchestrationRequest;
use mlorch_types::workflow::{Catalog, FieldSource, WorkflowDefinition};

use super::expression::{WorkflowEvaluator, request_context};

/// The catalog shipped with the binary.
const DEFAULT_CATALOG_YAML: &str = include_str!("default_catalog.yaml");

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while parsing or validating a catalog.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("catalog must contain at least one workflow")]
    Empty,

    #[error("duplicate workflow name '{0}'")]
    DuplicateWorkflow(String),

    #[error("workflow '{0}' must have at least one stage")]
    NoStages(String),

    #[error("stage {stage} of workflow '{workflow}' has no steps")]
    EmptyStage { workflow: String, stage: usize },

    #[error("duplicate step name '{step}' in workflow '{workflow}'")]
    DuplicateStep { workflow: String, step: String },

    #[error("workflow '{workflow}': {message}")]
    Invalid { workflow: String, message: String },

    #[error("workflow '{workflow}': invalid expression '{expression}': {message}")]
    InvalidExpression {
        workflow: String,
        expression: String,
        message: String,
    },

    #[error("step '{step}' field '{field}': {message}")]
    BadReference {
        step: String,
        field: String,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML catalog and validate it.
pub fn parse_catalog(yaml: &str) -> Result<Catalog, CatalogError> {
    let catalog: Catalog =
        serde_yaml_ng::from_str(yaml).map_err(|e| CatalogError::Parse(e.to_string()))?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

/// The built-in catalog (`update_profile`, `first_login`, and the four
/// single-purpose flows).
pub fn default_catalog() -> Result<Catalog, CatalogError> {
    parse_catalog(DEFAULT_CATALOG_YAML)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a catalog.
///
/// Checks:
/// - At least one workflow; workflow names unique and non-empty
/// - Every workflow has stages, every stage has steps
/// - Step names unique within a workflow; names and targets non-empty
/// - `max_concurrency >= 1`, timeouts and deadlines > 0 if set
/// - Selectors and conditions evaluate against a default request
/// - Step references in `input` point to steps of strictly earlier stages
///
/// Overlapping selectors are accepted. An always-true selector that is not
/// the last entry is logged since it shadows everything after it.
pub fn validate_catalog(catalog: &Catalog) -> Result<(), CatalogError> {
    if catalog.is_empty() {
        return Err(CatalogError::Empty);
    }

    let evaluator = WorkflowEvaluator::new();
    let sample = request_context(&OrchestrationRequest::new("validation", "validation"));

    let mut names = HashSet::new();
    let last = catalog.len() - 1;
    for (idx, workflow) in catalog.workflows.iter().enumerate() {
        if workflow.name.trim().is_empty() {
            return Err(CatalogError::Invalid {
                workflow: workflow.name.clone(),
                message: "workflow name must not be empty".to_string(),
            });
        }
        if !names.insert(workflow.name.as_str()) {
            return Err(CatalogError::DuplicateWorkflow(workflow.name.clone()));
        }

        let selector = evaluator
            .evaluate_bool(&workflow.selector, &sample)
            .map_err(|e| CatalogError::InvalidExpression {
                workflow: workflow.name.clone(),
                expression: workflow.selector.clone(),
                message: e.to_string(),
            })?;
        if idx != last && selector && workflow.selector.trim() == "true" {
            tracing::warn!(
                flow = workflow.name.as_str(),
                "unconditional selector is not last; later workflows are unreachable"
            );
        }

        validate_workflow(workflow, &evaluator, &sample)?;
    }

    Ok(())
}

fn validate_workflow(
    workflow: &WorkflowDefinition,
    evaluator: &WorkflowEvaluator,
    sample: &serde_json::Value,
) -> Result<(), CatalogError> {
    let invalid = |message: String| CatalogError::Invalid {
        workflow: workflow.name.clone(),
        message,
    };

    if workflow.stages.is_empty() {
        return Err(CatalogError::NoStages(workflow.name.clone()));
    }
    if workflow.deadline_secs == Some(0) {
        return Err(invalid("deadline_secs must be greater than 0".to_string()));
    }

    // Step name -> stage index, for reference checks.
    let mut stage_of: HashMap<&str, usize> = HashMap::new();
    for (stage_idx, stage) in workflow.stages.iter().enumerate() {
        if stage.steps.is_empty() {
            return Err(CatalogError::EmptyStage {
                workflow: workflow.name.clone(),
                stage: stage_idx,
            });
        }
        if stage.max_concurrency == Some(0) {
            return Err(invalid(format!("stage {stage_idx}: max_concurrency must be at least 1")));
        }
        for step in &stage.steps {
            if step.name.trim().is_empty() || step.target.trim().is_empty() {
                return Err(invalid(format!(
                    "stage {stage_idx}: step name and target must not be empty"
                )));
            }
            if stage_of.insert(step.name.as_str(), stage_idx).is_some() {
                return Err(CatalogError::DuplicateStep {
                    workflow: workflow.name.clone(),
                    step: step.name.clone(),
                });
            }
            if step.timeout_secs == Some(0) {
                return Err(invalid(format!(
                    "step '{}': timeout_secs must be greater than 0",
                    step.name
                )));
            }
        }
    }

    for (stage_idx, step) in workflow.steps() {
        if let Some(condition) = &step.condition {
            evaluator
                .evaluate_bool(condition, sample)
                .map_err(|e| CatalogError::InvalidExpression {
                    workflow: workflow.name.clone(),
                    expression: condition.clone(),
                    message: e.to_string(),
                })?;
        }

        for (field, source) in &step.input {
            let bad = |message: String| CatalogError::BadReference {
                step: step.name.clone(),
                field: field.clone(),
                message,
            };
            match source {
                FieldSource::Literal { .. } => {}
                FieldSource::Reference(reference) => {
                    if let Some(upstream) = source.step_reference() {
                        match stage_of.get(upstream.step) {
                            None => return Err(bad(format!("unknown step '{}'", upstream.step))),
                            Some(&upstream_stage) if upstream_stage >= stage_idx => {
                                return Err(bad(format!(
                                    "'{}' runs in stage {upstream_stage}, \
                                     not before stage {stage_idx}",
                                    upstream.step
                                )));
                            }
                            Some(_) => {}
                        }
                    } else if source.request_field().is_none_or(str::is_empty) {
                        return Err(bad(format!(
                            "'{reference}' is neither request.<field> nor steps.<name>.output"
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}
