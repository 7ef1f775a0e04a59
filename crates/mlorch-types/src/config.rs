//! Process configuration types for mlorch.
//!
//! `OrchestratorConfig` represents the `mlorch.toml` file that controls the
//! server address, executor defaults, endpoint resolution and the optional
//! webhook. Every field has a default so an empty (or missing) file is valid.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Workflow catalog file. The built-in catalog is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub http: HttpConfig,

    /// Explicit endpoint entries keyed by step target. Targets without an
    /// entry fall back to [`BUILTIN_ENDPOINT_ENVS`].
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointConfig>,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub dedup: DedupConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            catalog_path: None,
            server: ServerConfig::default(),
            executor: ExecutorConfig::default(),
            http: HttpConfig::default(),
            endpoints: BTreeMap::new(),
            webhook: WebhookConfig::default(),
            dedup: DedupConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Endpoint entry for a target: the configured one, else the built-in
    /// environment-variable mapping.
    pub fn endpoint(&self, target: &str) -> Option<EndpointConfig> {
        if let Some(entry) = self.endpoints.get(target) {
            return Some(entry.clone());
        }
        BUILTIN_ENDPOINT_ENVS
            .iter()
            .find(|(t, _)| *t == target)
            .map(|(_, env)| EndpointConfig {
                url: None,
                url_env: Some((*env).to_string()),
            })
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Defaults applied to steps that do not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default)]
    pub default_retry_count: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub default_retry_backoff_ms: u64,
    /// Overall per-request deadline.
    #[serde(default = "default_flow_deadline_secs")]
    pub flow_deadline_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

fn default_flow_deadline_secs() -> u64 {
    540
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            default_retry_count: 0,
            default_retry_backoff_ms: default_retry_backoff_ms(),
            flow_deadline_secs: default_flow_deadline_secs(),
        }
    }
}

/// Outgoing HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Value sent in the `X-Orchestrator` header on every remote call.
    #[serde(default = "default_orchestrator_header")]
    pub orchestrator_header: String,
}

fn default_user_agent() -> String {
    concat!("mlorch/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_orchestrator_header() -> String {
    "mlorch".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            orchestrator_header: default_orchestrator_header(),
        }
    }
}

/// How a step target resolves to a URL.
///
/// `url` wins over `url_env`; a target whose URL resolves to nothing is
/// "not configured" and its steps are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_env: Option<String>,
}

/// Built-in target -> environment variable table used when no explicit
/// `[endpoints.<target>]` entry exists.
pub const BUILTIN_ENDPOINT_ENVS: &[(&str, &str)] = &[
    ("create_embeddings", "DEFAULT_CREATE_USER_EMBEDDINGS_URL"),
    ("match_candidato", "DEFAULT_MATCH_CANDIDATO_URL"),
    ("match_analysis_user_vacancy", "DEFAULT_MATCH_ANALYSIS_USER_VACANCY_URL"),
    ("gap_analysis_user_vacancy", "DEFAULT_GAP_ANALYSIS_USER_VACANCY_URL"),
    ("suggest_course_vacancy", "DEFAULT_SUGGEST_COURSE_VACANCY_URL"),
    ("match_usuario_profissao", "MATCH_USUARIO_PROFISSAO_URL"),
    ("match_usuario_carreira", "MATCH_USUARIO_CARREIRA_URL"),
    ("match_analysis_user_profession", "MATCH_ANALYSIS_USER_PROFESSION_URL"),
    ("gap_analysis_user_profession", "GAP_ANALYSIS_USER_PROFESSION_URL"),
    ("suggest_course_profession", "SUGGEST_COURSE_PROFESSION_URL"),
];

/// Completion webhook. Disabled when no URL resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_webhook_env")]
    pub url_env: Option<String>,
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_webhook_env() -> Option<String> {
    Some("DEFAULT_WEBHOOK_URL".to_string())
}

fn default_webhook_timeout_secs() -> u64 {
    15
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            url_env: default_webhook_env(),
            timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

/// Duplicate-request detection window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dedup_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_dedup_ttl_secs() -> u64 {
    300
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_dedup_ttl_secs(),
        }
    }
}
