//! Payload construction from a step's input mapping.
//!
//! Each input entry names a payload field and its source: a request field,
//! the output of a step from an earlier stage, or a literal. Request values
//! that are `null` or absent are left out of the payload; a missing upstream
//! output is a `MappingError` and the remote function is never called.

use serde_json::{Map, Value};

use mlorch_types::workflow::{FieldSource, StepSpec};

use super::context::ExecutionContext;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("field '{field}': no output recorded for step '{step}'")]
    MissingOutput { field: String, step: String },

    #[error("field '{field}': path '{reference}' not found in step output")]
    MissingPath { field: String, reference: String },

    #[error("field '{field}': unsupported source '{reference}'")]
    InvalidReference { field: String, reference: String },
}

/// Build the outgoing JSON payload for `step`.
pub fn build_payload(
    step: &StepSpec,
    ctx: &ExecutionContext,
) -> Result<Map<String, Value>, MappingError> {
    let mut payload = Map::new();

    for (field, source) in &step.input {
        match source {
            FieldSource::Literal { value } => {
                payload.insert(field.clone(), value.clone());
            }
            FieldSource::Reference(reference) => {
                if let Some(path) = source.request_field() {
                    let mut parts = path.split('.');
                    let value = parts
                        .next()
                        .and_then(|head| ctx.request_field(head))
                        .and_then(|root| walk(root, parts));
                    if let Some(value) = value.filter(|v| !v.is_null()) {
                        payload.insert(field.clone(), value.clone());
                    }
                } else if let Some(step_ref) = source.step_reference() {
                    let output =
                        ctx.output(step_ref.step).ok_or_else(|| MappingError::MissingOutput {
                            field: field.clone(),
                            step: step_ref.step.to_string(),
                        })?;
                    let value = walk(output, step_ref.path.iter().copied()).ok_or_else(|| {
                        MappingError::MissingPath {
                            field: field.clone(),
                            reference: reference.clone(),
                        }
                    })?;
                    payload.insert(field.clone(), value.clone());
                } else {
                    return Err(MappingError::InvalidReference {
                        field: field.clone(),
                        reference: reference.clone(),
                    });
                }
            }
        }
    }

    Ok(payload)
}

/// First non-empty string among the step's `auth_token_fields`.
pub fn resolve_bearer_token(step: &StepSpec, ctx: &ExecutionContext) -> Option<String> {
    step.auth_token_fields.iter().find_map(|field| {
        ctx.request_field(field)
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    })
}

/// Follow a dotted path into a JSON value. Numeric segments index arrays.
fn walk<'a, 'p>(root: &'a Value, path: impl Iterator<Item = &'p str>) -> Option<&'a Value> {
    path.into_iter().try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
