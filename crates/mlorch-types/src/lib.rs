//! Shared domain types for mlorch.
//!
//! This crate contains the types used across the orchestrator: the workflow
//! catalog, the orchestration request, step and flow results, execution
//! events and the process configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod event;
pub mod request;
pub mod result;
pub mod workflow;
