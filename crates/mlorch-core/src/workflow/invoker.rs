//! The remote-call collaborator contract.
//!
//! The step executor never talks HTTP itself; it hands a [`RemoteCall`] to a
//! [`RemoteInvoker`] and classifies the outcome. Implementations must surface
//! a timeout distinctly from a connection failure and from a non-2xx
//! response so that retry eligibility can be decided.
//!
//! Uses RPITIT (return-position `impl Trait` in traits) for the async method.

use std::time::Duration;

use serde_json::{Map, Value};

/// One outgoing call to a remote function.
#[derive(Debug, Clone)]
pub struct RemoteCall {
    /// Logical endpoint reference (the step's `target`).
    pub target: String,
    pub payload: Map<String, Value>,
    /// Forwarded as `Authorization: Bearer <token>` when present.
    pub bearer_token: Option<String>,
    pub timeout: Duration,
}

/// A successful (2xx) response with a parsed JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status_code: u16,
    pub body: Value,
}

/// Failure of a single remote call.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("connection error: {0}")]
    Connection(String),

    /// A non-2xx response.
    #[error("remote returned HTTP {code}")]
    Status { code: u16, body: Option<String> },

    #[error("malformed response body: {0}")]
    MalformedBody(String),

    /// No URL is configured for the target.
    #[error("endpoint not configured for target '{0}'")]
    Unconfigured(String),
}

impl TransportError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Invokes remote functions on behalf of the step executor.
pub trait RemoteInvoker: Send + Sync {
    fn invoke(
        &self,
        call: RemoteCall,
    ) -> impl std::future::Future<Output = Result<RemoteResponse, TransportError>> + Send;
}
