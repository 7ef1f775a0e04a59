//! Config file loader for `mlorch.toml`.
//!
//! Reads the TOML config if present, falling back to defaults when the file
//! is missing or malformed. Callers that named the file explicitly can use
//! [`read_config`] to get the error instead.

use std::path::Path;
use std::time::Duration;

use mlorch_core::workflow::StepDefaults;
use mlorch_types::config::{EndpointConfig, ExecutorConfig, OrchestratorConfig};

/// Errors from reading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Read and parse a config file, reporting any failure.
pub async fn read_config(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Load the config at `path`.
///
/// Returns `OrchestratorConfig::default()` if the file doesn't exist or
/// can't be parsed.
pub async fn load_config(path: &Path) -> OrchestratorConfig {
    match read_config(path).await {
        Ok(config) => config,
        Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            OrchestratorConfig::default()
        }
        Err(err) => {
            tracing::warn!("{err}, using defaults");
            OrchestratorConfig::default()
        }
    }
}

/// Executor defaults from the `[executor]` section.
pub fn step_defaults(executor: &ExecutorConfig) -> StepDefaults {
    StepDefaults {
        timeout: Duration::from_secs(executor.default_timeout_secs),
        retry_count: executor.default_retry_count,
        retry_backoff: Duration::from_millis(executor.default_retry_backoff_ms),
    }
}

/// Resolve an endpoint entry to a URL: `url` first, then the variable named
/// by `url_env`. Blank values count as unset.
pub fn resolve_url(entry: &EndpointConfig) -> Option<String> {
    resolve_url_with(entry, |name| std::env::var(name).ok())
}

fn resolve_url_with(
    entry: &EndpointConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    let non_blank = |s: String| {
        let trimmed = s.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };
    entry
        .url
        .clone()
        .and_then(non_blank)
        .or_else(|| entry.url_env.as_deref().and_then(&lookup).and_then(non_blank))
}
