//! Workflow orchestration engine for mlorch.
//!
//! This crate holds the router, the staged flow executor and the step
//! executor, plus the collaborator traits (`RemoteInvoker`, `EventSink`) that
//! the infrastructure layer implements. It depends only on `mlorch-types` --
//! never on `mlorch-infra` or any HTTP client crate.

pub mod event;
pub mod workflow;
