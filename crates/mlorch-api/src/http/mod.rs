//! HTTP surface for the orchestrator.
//!
//! Axum routes for orchestration, health and catalog inspection, with CORS
//! and request tracing.

pub mod error;
pub mod handlers;
pub mod router;
