use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowInputError;
use crate::model::WorkflowInput;

/// Validation decision for a workflow input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Warn,
    Block,
}

/// Result of validating a workflow input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub decision: Decision,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub violations: Vec<String>,
}

impl ValidationOutcome {
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            warnings: vec![],
            violations: vec![],
        }
    }

    pub fn warn(mut self, msg: impl Into<String>) -> Self {
        if self.decision != Decision::Block {
            self.decision = Decision::Warn;
        }
        self.warnings.push(msg.into());
        self
    }

    pub fn block(mut self, msg: impl Into<String>) -> Self {
        self.decision = Decision::Block;
        self.violations.push(msg.into());
        self
    }
}

/// Envelope written by the build stage around the workflow input.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BuildArtifactEnvelope {
    code_build_to_sfn_artifact: WorkflowInput,
}

/// Validate a parsed workflow input.
///
/// Rules:
/// - Every artifact needs a non-empty bucket and key.
/// - An empty artifact list, duplicate entries, an empty
///   `EnvironmentEvaluation` and keys that are absolute or contain a `..`
///   segment are allowed but reported. Whether such a key can be read is
///   up to the object store, and a failed read only fails that artifact.
pub fn validate_workflow_input(input: &WorkflowInput) -> ValidationOutcome {
    let mut out = ValidationOutcome::allow();

    if input.code_build_inputs.is_empty() {
        out = out.warn("CodeBuildInputs is empty; nothing will be evaluated");
    }

    if input.context.environment_evaluation.trim().is_empty() {
        out = out.warn("Context.EnvironmentEvaluation is empty");
    }

    let mut seen = HashSet::new();
    for (idx, artifact) in input.code_build_inputs.iter().enumerate() {
        if artifact.bucket.trim().is_empty() {
            out = out.block(format!("CodeBuildInputs[{idx}]: Bucket must not be empty"));
        }
        if artifact.key.trim().is_empty() {
            out = out.block(format!("CodeBuildInputs[{idx}]: Key must not be empty"));
        } else if !is_safe_key(&artifact.key) {
            out = out.warn(format!(
                "CodeBuildInputs[{idx}]: Key '{}' is absolute or contains '..'",
                artifact.key
            ));
        }
        if !seen.insert(artifact) {
            out = out.warn(format!(
                "CodeBuildInputs[{idx}]: duplicate of an earlier entry ({artifact}); it is evaluated again"
            ));
        }
    }

    out
}

/// Parse and validate the top-level workflow document.
///
/// Accepts the bare `{CodeBuildInputs, Context}` shape and the build-stage
/// envelope `{CodeBuildToSfnArtifact: {...}}`.
pub fn parse_workflow_input(raw: &[u8]) -> Result<WorkflowInput, WorkflowInputError> {
    let value: serde_json::Value = serde_json::from_slice(raw)?;
    let input = if value.get("CodeBuildToSfnArtifact").is_some() {
        serde_json::from_value::<BuildArtifactEnvelope>(value)?.code_build_to_sfn_artifact
    } else {
        serde_json::from_value::<WorkflowInput>(value)?
    };

    let outcome = validate_workflow_input(&input);
    for warning in &outcome.warnings {
        tracing::warn!(warning = %warning, "workflow input");
    }
    if outcome.decision == Decision::Block {
        return Err(WorkflowInputError::Invalid(outcome.violations));
    }
    Ok(input)
}

/// Returns true if `key` is a relative object key with no `..` segment.
pub fn is_safe_key(key: &str) -> bool {
    !key.starts_with('/') && !key.split('/').any(|segment| segment == "..")
}
