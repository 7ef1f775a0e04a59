//! HttpInvoker -- reqwest implementation of [`RemoteInvoker`].
//!
//! Each step target resolves to a URL through the `[endpoints]` config
//! section (explicit `url`, or an environment variable). The payload is
//! POSTed as JSON with:
//!
//! - `Authorization: Bearer <token>` when the step resolved a token
//! - `X-Orchestrator: <http.orchestrator_header>`
//! - the configured `User-Agent`
//!
//! Failures are reported so the step executor can tell a timeout from a
//! connection error from a non-2xx response. The token is never logged.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use mlorch_core::workflow::{RemoteCall, RemoteInvoker, RemoteResponse, TransportError};
use mlorch_types::config::OrchestratorConfig;

use crate::config::resolve_url;

/// Header carrying the orchestrator identity on every remote call.
pub const ORCHESTRATOR_HEADER: HeaderName = HeaderName::from_static("x-orchestrator");

/// Longest error body kept in a `TransportError::Status`.
const MAX_ERROR_BODY: usize = 2_048;

/// Remote function invoker over HTTP.
///
/// Holds one pooled `reqwest::Client` shared by every request.
#[derive(Clone)]
pub struct HttpInvoker {
    client: reqwest::Client,
    config: Arc<OrchestratorConfig>,
}

impl HttpInvoker {
    pub fn new(config: Arc<OrchestratorConfig>) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&config.http.orchestrator_header) {
            headers.insert(ORCHESTRATOR_HEADER, value);
        } else {
            tracing::warn!(
                value = config.http.orchestrator_header.as_str(),
                "orchestrator header value is not a valid header, omitting it"
            );
        }

        let client = reqwest::Client::builder()
            .user_agent(config.http.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    /// URL for a step target, or `None` when the target is not configured.
    pub fn resolve_target(&self, target: &str) -> Option<String> {
        self.config.endpoint(target).as_ref().and_then(resolve_url)
    }
}

impl RemoteInvoker for HttpInvoker {
    async fn invoke(&self, call: RemoteCall) -> Result<RemoteResponse, TransportError> {
        let url = self
            .resolve_target(&call.target)
            .ok_or_else(|| TransportError::Unconfigured(call.target.clone()))?;

        tracing::debug!(
            target = call.target.as_str(),
            url = url.as_str(),
            payload_keys = ?call.payload.keys().collect::<Vec<_>>(),
            has_auth = call.bearer_token.is_some(),
            "calling remote function"
        );

        let mut request = self
            .client
            .post(&url)
            .timeout(call.timeout)
            .json(&call.payload);
        if let Some(token) = &call.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| send_error(e, &call))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .ok()
                .filter(|b| !b.is_empty())
                .map(|mut b| {
                    if b.len() > MAX_ERROR_BODY {
                        let mut cut = MAX_ERROR_BODY;
                        while !b.is_char_boundary(cut) {
                            cut -= 1;
                        }
                        b.truncate(cut);
                    }
                    b
                });
            tracing::debug!(
                target = call.target.as_str(),
                status = status.as_u16(),
                "remote function returned an error status"
            );
            return Err(TransportError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| send_error(e, &call))?;
        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|e| TransportError::MalformedBody(e.to_string()))?
        };

        Ok(RemoteResponse {
            status_code: status.as_u16(),
            body,
        })
    }
}

/// Map a reqwest failure before or while reading the response.
fn send_error(err: reqwest::Error, call: &RemoteCall) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            after_ms: call.timeout.as_millis() as u64,
        }
    } else {
        TransportError::Connection(err.without_url().to_string())
    }
}
