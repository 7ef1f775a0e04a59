//! Catalog inspection and service info handlers.

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use serde_json::{Value, json};

use mlorch_types::workflow::WorkflowDefinition;

use crate::state::AppState;

/// Catalog entry as listed by `GET /workflows` and `mlorch catalog list`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub selector: String,
    pub stages: usize,
    pub steps: Vec<String>,
}

impl From<&WorkflowDefinition> for WorkflowSummary {
    fn from(wf: &WorkflowDefinition) -> Self {
        Self {
            name: wf.name.clone(),
            description: wf.description.clone(),
            selector: wf.selector.clone(),
            stages: wf.stages.len(),
            steps: wf.steps().map(|(_, step)| step.name.clone()).collect(),
        }
    }
}

/// GET /workflows - catalog entries in evaluation order.
pub async fn list_workflows(State(state): State<AppState>) -> Json<Vec<WorkflowSummary>> {
    Json(
        state
            .router
            .catalog()
            .workflows
            .iter()
            .map(WorkflowSummary::from)
            .collect(),
    )
}

/// GET / - service info.
pub async fn service_info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "mlorch",
        "version": env!("CARGO_PKG_VERSION"),
        "workflows": state
            .router
            .catalog()
            .workflows
            .iter()
            .map(|wf| wf.name.as_str())
            .collect::<Vec<_>>(),
        "webhook_enabled": state.webhook.is_enabled(),
        "dedup_enabled": state.dedup.is_some(),
        "flow_deadline_secs": state.config.executor.flow_deadline_secs,
    }))
}

/// GET /health - liveness check.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
