//! Observability setup for mlorch: the global tracing subscriber.

pub mod tracing_setup;
