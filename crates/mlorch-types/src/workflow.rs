//! Workflow catalog types.
//!
//! The catalog is an ordered list of `WorkflowDefinition`s loaded once at
//! startup (YAML or the built-in default) and shared read-only by every
//! request. Each definition is a sequence of `Stage`s; each stage is a set of
//! `StepSpec`s that may run concurrently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The ordered workflow catalog.
///
/// Order is significant: the router evaluates selectors in declaration order
/// and the first match wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub workflows: Vec<WorkflowDefinition>,
}

impl Catalog {
    /// Look up a workflow by name.
    pub fn get(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.workflows.iter().find(|w| w.name == name)
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A named workflow: a selector plus an ordered sequence of stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique workflow name (e.g. "first_login").
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JEXL expression over the request; the first workflow whose selector
    /// is truthy is selected.
    pub selector: String,
    /// Per-workflow overall deadline in seconds (overrides the global default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
    /// Stages, executed strictly in order.
    pub stages: Vec<Stage>,
}

impl WorkflowDefinition {
    /// Total number of steps across all stages.
    pub fn step_count(&self) -> usize {
        self.stages.iter().map(|s| s.steps.len()).sum()
    }

    /// Iterate over `(stage_index, step)` pairs in execution order.
    pub fn steps(&self) -> impl Iterator<Item = (usize, &StepSpec)> {
        self.stages
            .iter()
            .enumerate()
            .flat_map(|(idx, stage)| stage.steps.iter().map(move |step| (idx, step)))
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A set of steps eligible to run concurrently, gated by a barrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Steps of this stage. Results are reported in declaration order.
    pub steps: Vec<StepSpec>,
    /// Maximum number of in-flight remote calls within this stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

impl Stage {
    /// The concurrency bound actually applied (defaults to the stage size).
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency
            .unwrap_or(self.steps.len())
            .clamp(1, self.steps.len().max(1))
    }
}

// ---------------------------------------------------------------------------
// Step Spec
// ---------------------------------------------------------------------------

/// Static description of one remote call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// Step name, unique within the workflow.
    pub name: String,
    /// Logical endpoint reference, resolved by the HTTP collaborator.
    pub target: String,
    /// Payload construction rules: payload field -> source.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input: BTreeMap<String, FieldSource>,
    /// Whether a failure of this step aborts the remaining stages.
    #[serde(default)]
    pub criticality: Criticality,
    /// Optional JEXL predicate over the request; false means skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Per-call timeout in seconds (overrides the configured default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Retries after the first attempt for transient failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    /// Base delay before the first retry; doubles on each further retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_ms: Option<u64>,
    /// Request fields searched, in order, for a bearer token to forward.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auth_token_fields: Vec<String>,
}

impl StepSpec {
    pub fn is_critical(&self) -> bool {
        self.criticality == Criticality::Critical
    }

    /// Names of the steps whose outputs this step's input mapping reads.
    pub fn upstream_steps(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .input
            .values()
            .filter_map(FieldSource::step_reference)
            .map(|r| r.step)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Whether a step's failure aborts the remaining workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    #[default]
    Critical,
    Optional,
}

impl std::fmt::Display for Criticality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Criticality::Critical => write!(f, "critical"),
            Criticality::Optional => write!(f, "optional"),
        }
    }
}

// ---------------------------------------------------------------------------
// Input mapping sources
// ---------------------------------------------------------------------------

/// Where a payload field's value comes from.
///
/// In YAML a reference is a plain string and a literal is a map:
/// ```yaml
/// input:
///   user_id: request.user_id
///   profile: steps.create_embeddings.output.profile
///   source: { value: "orchestrator" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSource {
    /// `request.<field>` or `steps.<name>.output[.<path>...]`.
    Reference(String),
    /// A constant JSON value.
    Literal { value: Value },
}

/// A parsed `steps.<name>.output[.<path>]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReference<'a> {
    pub step: &'a str,
    pub path: Vec<&'a str>,
}

impl FieldSource {
    /// The request field named by a `request.<field>` reference.
    pub fn request_field(&self) -> Option<&str> {
        match self {
            FieldSource::Reference(r) => r.strip_prefix("request."),
            FieldSource::Literal { .. } => None,
        }
    }

    /// The step output named by a `steps.<name>.output[...]` reference.
    pub fn step_reference(&self) -> Option<StepReference<'_>> {
        let FieldSource::Reference(r) = self else {
            return None;
        };
        let rest = r.strip_prefix("steps.")?;
        let mut parts = rest.split('.');
        let step = parts.next().filter(|s| !s.is_empty())?;
        if parts.next() != Some("output") {
            return None;
        }
        Some(StepReference {
            step,
            path: parts.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"
workflows:
  - name: first_login
    selector: "true"
    stages:
      - max_concurrency: 1
        steps:
          - name: match_candidato
            target: match_candidato
            input:
              user_id: request.user_id
              source: { value: "orchestrator" }
      - steps:
          - name: suggest_course_vacancy
            target: suggest_course_vacancy
            criticality: optional
            retry_count: 2
            input:
              matches: steps.match_candidato.output.matches
"#;

    #[test]
    fn test_catalog_yaml_deserialize() {
        let catalog: Catalog = serde_yaml_ng::from_str(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 1);

        let wf = catalog.get("first_login").unwrap();
        assert_eq!(wf.stages.len(), 2);
        assert_eq!(wf.step_count(), 2);

        let first = &wf.stages[0].steps[0];
        assert_eq!(first.criticality, Criticality::Critical);
        assert_eq!(
            first.input.get("user_id"),
            Some(&FieldSource::Reference("request.user_id".to_string()))
        );
        assert_eq!(
            first.input.get("source"),
            Some(&FieldSource::Literal { value: json!("orchestrator") })
        );

        let second = &wf.stages[1].steps[0];
        assert!(!second.is_critical());
        assert_eq!(second.retry_count, Some(2));
        assert_eq!(second.upstream_steps(), vec!["match_candidato"]);
    }

    #[test]
    fn test_effective_concurrency_defaults_to_stage_size() {
        let catalog: Catalog = serde_yaml_ng::from_str(SAMPLE).unwrap();
        let wf = &catalog.workflows[0];
        assert_eq!(wf.stages[0].effective_concurrency(), 1);
        assert_eq!(wf.stages[1].effective_concurrency(), 1);

        let stage = Stage {
            steps: vec![wf.stages[0].steps[0].clone(); 3],
            max_concurrency: None,
        };
        assert_eq!(stage.effective_concurrency(), 3);
    }

    #[test]
    fn test_step_reference_parsing() {
        let src = FieldSource::Reference("steps.embed.output.vector.0".to_string());
        let r = src.step_reference().unwrap();
        assert_eq!(r.step, "embed");
        assert_eq!(r.path, vec!["vector", "0"]);

        let whole = FieldSource::Reference("steps.embed.output".to_string());
        assert!(whole.step_reference().unwrap().path.is_empty());

        let not_output = FieldSource::Reference("steps.embed.status".to_string());
        assert!(not_output.step_reference().is_none());

        let req = FieldSource::Reference("request.vacancy_id".to_string());
        assert_eq!(req.request_field(), Some("vacancy_id"));
        assert!(req.step_reference().is_none());
    }

    #[test]
    fn test_steps_iterates_in_stage_order() {
        let catalog: Catalog = serde_yaml_ng::from_str(SAMPLE).unwrap();
        let order: Vec<(usize, &str)> = catalog.workflows[0]
            .steps()
            .map(|(i, s)| (i, s.name.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![(0, "match_candidato"), (1, "suggest_course_vacancy")]
        );
    }
}
