//! Workflow engine core: catalog validation, routing and staged execution.
//!
//! - `catalog` -- built-in catalog, YAML parsing and load-time validation
//! - `router` -- first-match selection of a workflow for a request
//! - `context` -- per-request execution context with write-once outputs
//! - `expression` -- JEXL evaluator for selectors and step conditions
//! - `mapping` -- payload construction from the request and prior outputs
//! - `retry` -- transient-failure classification and backoff schedule
//! - `invoker` -- the remote-call collaborator contract
//! - `step_executor` -- one remote call with timeout and retry
//! - `flow_executor` -- stages, barriers, concurrency bound and abort policy

pub mod catalog;
pub mod context;
pub mod expression;
pub mod flow_executor;
pub mod invoker;
pub mod mapping;
pub mod retry;
pub mod router;
pub mod step_executor;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{CatalogError, default_catalog, parse_catalog, validate_catalog};
pub use context::ExecutionContext;
pub use flow_executor::FlowExecutor;
pub use invoker::{RemoteCall, RemoteInvoker, RemoteResponse, TransportError};
pub use router::{FlowRouter, RouterError};
pub use step_executor::{StepDefaults, StepExecutor};
