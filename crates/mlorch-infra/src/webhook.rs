//! Completion webhook.
//!
//! After a flow finishes, the full report is POSTed to the configured URL.
//! Delivery is best effort: failures are logged and never reach the caller.

use std::time::Duration;

use mlorch_types::config::{EndpointConfig, WebhookConfig};
use mlorch_types::result::FlowResult;

use crate::config::resolve_url;

/// Posts flow reports to a webhook URL, if one is configured.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookNotifier {
    /// Build a notifier from the `[webhook]` section. The URL is resolved once.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &WebhookConfig) -> Result<Self, reqwest::Error> {
        let url = resolve_url(&EndpointConfig {
            url: config.url.clone(),
            url_env: config.url_env.clone(),
        });
        Self::with_url(url, Duration::from_secs(config.timeout_secs))
    }

    /// Every delivery is bounded by `timeout`.
    pub fn with_url(url: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Deliver `report`. Returns whether the webhook accepted it.
    pub async fn notify(&self, report: &FlowResult) -> bool {
        let Some(url) = &self.url else {
            tracing::debug!(
                execution_id = %report.execution_id,
                "webhook skipped, no url configured"
            );
            return false;
        };

        tracing::info!(
            execution_id = %report.execution_id,
            url = url.as_str(),
            "sending completion webhook"
        );

        match self.client.post(url).json(report).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    execution_id = %report.execution_id,
                    status_code = response.status().as_u16(),
                    "webhook delivered"
                );
                true
            }
            Ok(response) => {
                tracing::warn!(
                    execution_id = %report.execution_id,
                    status_code = response.status().as_u16(),
                    "webhook rejected"
                );
                false
            }
            Err(err) => {
                tracing::error!(
                    execution_id = %report.execution_id,
                    error = %err.without_url(),
                    "webhook delivery failed"
                );
                false
            }
        }
    }
}
