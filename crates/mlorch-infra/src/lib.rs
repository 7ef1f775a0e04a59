//! Infrastructure layer for mlorch.
//!
//! Contains the implementations of the collaborator traits defined in
//! `mlorch-core` and the loaders for process configuration: the reqwest
//! `HttpInvoker`, TOML config and YAML catalog loading, the completion
//! webhook and duplicate-request tracking.

pub mod catalog;
pub mod config;
pub mod dedup;
pub mod http;
pub mod webhook;
