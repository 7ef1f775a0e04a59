//! Flow router: maps an orchestration request to one workflow definition.
//!
//! Selectors are evaluated in catalog order and the first one that holds
//! wins. Overlapping selectors are allowed; the catalog order is the
//! precedence.

use std::sync::Arc;

use mlorch_types::request::OrchestrationRequest;
use mlorch_types::workflow::{Catalog, WorkflowDefinition};

use super::expression::{WorkflowEvaluator, request_context};

/// Errors returned by [`FlowRouter::select`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouterError {
    /// No selector matched the request. A caller-input failure.
    #[error("no workflow matches the request flags")]
    NoMatch,
}

/// Selects workflows from a shared, immutable catalog.
#[derive(Debug, Clone)]
pub struct FlowRouter {
    catalog: Arc<Catalog>,
}

impl FlowRouter {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Return the first workflow whose selector holds for `request`.
    ///
    /// A selector that fails to evaluate counts as false for that entry.
    pub fn select(
        &self,
        request: &OrchestrationRequest,
    ) -> Result<&WorkflowDefinition, RouterError> {
        let evaluator = WorkflowEvaluator::new();
        let context = request_context(request);

        for workflow in &self.catalog.workflows {
            match evaluator.evaluate_bool(&workflow.selector, &context) {
                Ok(true) => {
                    tracing::debug!(
                        flow = workflow.name.as_str(),
                        user_id = request.user_id.as_str(),
                        "workflow selected"
                    );
                    return Ok(workflow);
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(
                        flow = workflow.name.as_str(),
                        selector = workflow.selector.as_str(),
                        error = %err,
                        "selector failed to evaluate, treating as false"
                    );
                }
            }
        }

        tracing::info!(user_id = request.user_id.as_str(), "no workflow matched request");
        Err(RouterError::NoMatch)
    }
}
