//! Per-request execution context.
//!
//! `ExecutionContext` is created once per request and owned by a single
//! flow executor run. Step outputs are folded in by the flow executor after
//! each stage's barrier; a step name can be written at most once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use mlorch_types::request::OrchestrationRequest;

/// Errors raised when mutating the context.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("output for step '{0}' was already recorded")]
    OutputAlreadyRecorded(String),
}

/// Mutable state accumulated over one workflow run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Unique per execution, echoed in every event and in the result.
    pub execution_id: Uuid,
    pub flow_name: String,
    pub request: Arc<OrchestrationRequest>,
    /// Request as JSON, computed once for mappings and token lookup.
    request_value: Arc<Value>,
    outputs: HashMap<String, Value>,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(flow_name: impl Into<String>, request: OrchestrationRequest) -> Self {
        let request_value = request.to_value();
        Self {
            execution_id: Uuid::now_v7(),
            flow_name: flow_name.into(),
            request: Arc::new(request),
            request_value: Arc::new(request_value),
            outputs: HashMap::new(),
            started_at: Utc::now(),
        }
    }

    /// The request as a JSON object.
    pub fn request_value(&self) -> &Value {
        &self.request_value
    }

    /// Look up a top-level request field. `null` values count as absent.
    pub fn request_field(&self, field: &str) -> Option<&Value> {
        self.request_value.get(field).filter(|v| !v.is_null())
    }

    /// Record a step's output. Each step name is write-once.
    pub fn record_output(&mut self, step_name: &str, output: Value) -> Result<(), ContextError> {
        if self.outputs.contains_key(step_name) {
            return Err(ContextError::OutputAlreadyRecorded(step_name.to_string()));
        }
        self.outputs.insert(step_name.to_string(), output);
        Ok(())
    }

    pub fn output(&self, step_name: &str) -> Option<&Value> {
        self.outputs.get(step_name)
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }
}
