//! HTTP request handlers.

pub mod orchestrate;
pub mod workflow;
