//! The orchestration request submitted by callers.
//!
//! Known flags and identifiers are typed fields with the defaults callers rely
//! on; anything else (per-step `*_token` fields, custom flags) is kept in
//! `extra` so selectors, conditions and input mappings can still see it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while validating an incoming request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request body could not be decoded.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// One or more required fields are missing or invalid.
    #[error("invalid request: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// An orchestration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationRequest {
    pub user_id: String,
    pub session_id: String,

    // Flow-selection flags
    #[serde(default)]
    pub create_user_embedding: bool,
    #[serde(default = "default_true")]
    pub process_profession_orchestrator: bool,
    #[serde(default = "default_true")]
    pub process_vacancy_orchestrator: bool,
    #[serde(default)]
    pub process_only_profession_course: bool,
    #[serde(default)]
    pub process_only_profession_skills: bool,
    #[serde(default)]
    pub process_only_vacancy_course: bool,
    #[serde(default)]
    pub process_only_vacancy_skills: bool,

    // Optional parameters
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub vacancy_id: Option<String>,
    #[serde(default)]
    pub vacancy_name: Option<String>,
    #[serde(default)]
    pub vacancy_description: Option<String>,
    #[serde(default)]
    pub position_id: Option<String>,
    #[serde(default)]
    pub position_name: Option<String>,
    #[serde(default)]
    pub career_name: Option<String>,

    /// Any further fields (auth tokens, custom flags).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

/// Request fields echoed back in the flow report when present.
pub const ECHOED_FIELDS: &[&str] = &[
    "identifier",
    "vacancy_id",
    "vacancy_name",
    "position_id",
    "career_name",
];

impl OrchestrationRequest {
    /// Minimal request with every flag at its default.
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            create_user_embedding: false,
            process_profession_orchestrator: true,
            process_vacancy_orchestrator: true,
            process_only_profession_course: false,
            process_only_profession_skills: false,
            process_only_vacancy_course: false,
            process_only_vacancy_skills: false,
            identifier: None,
            vacancy_id: None,
            vacancy_name: None,
            vacancy_description: None,
            position_id: None,
            position_name: None,
            career_name: None,
            extra: Map::new(),
        }
    }

    /// Decode and validate a request from an arbitrary JSON body.
    pub fn from_json(body: Value) -> Result<Self, RequestError> {
        let request: Self =
            serde_json::from_value(body).map_err(|e| RequestError::Malformed(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    /// Check required fields.
    ///
    /// `user_id` and `session_id` must be non-blank; any `*_token` field
    /// present in `extra` must be a string or null.
    pub fn validate(&self) -> Result<(), RequestError> {
        let mut errors = Vec::new();

        if self.user_id.trim().is_empty() {
            errors.push("Missing required field: user_id".to_string());
        }
        if self.session_id.trim().is_empty() {
            errors.push("Missing required field: session_id".to_string());
        }

        for (key, value) in &self.extra {
            if key.ends_with("_token") && !(value.is_string() || value.is_null()) {
                errors.push(format!("Field '{key}' must be a string if provided"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RequestError::Invalid(errors))
        }
    }

    /// The request as a JSON object, with absent optionals as `null`.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Key used for duplicate-request detection.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.user_id,
            self.session_id,
            self.identifier.as_deref().unwrap_or("")
        )
    }
}
