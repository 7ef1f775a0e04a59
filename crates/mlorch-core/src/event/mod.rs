//! Execution event distribution.
//!
//! The flow executor reports lifecycle events through the `EventSink` trait.
//! `TracingSink` turns them into structured log lines; `EventBus` fans them
//! out to subscribers over a `tokio::sync::broadcast` channel.

pub mod bus;
pub mod sink;

pub use bus::EventBus;
pub use sink::{EventSink, TracingSink};
