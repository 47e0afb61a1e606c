use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateReport;
use crate::error::EvaluationError;

/// Reference to one build artifact in object storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub struct CodeBuildInput {
    pub bucket: String,
    pub key: String,
}

impl CodeBuildInput {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for CodeBuildInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Opaque metadata forwarded with every evaluation request.
///
/// The evaluation service uses it for policy selection; the gate never
/// interprets it. Keys beyond the two named ones are kept in `extra` so the
/// document reaches the service exactly as the build stage wrote it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Context {
    pub environment_evaluation: String,
    #[serde(default)]
    pub pipeline_ownership_metadata: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The document handed to one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct WorkflowInput {
    pub code_build_inputs: Vec<CodeBuildInput>,
    pub context: Context,
    /// Pipeline execution that produced the artifacts, when the build stage recorded it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_pipeline_execution_id: Option<String>,
}

/// Verdict reported by a single output handler for one artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct HandlerVerdict {
    pub handler: String,
    pub is_compliant: bool,
}

/// Result of evaluating one artifact. Written once by the fan-out stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PerArtifactOutcome {
    pub artifact: CodeBuildInput,
    pub is_compliant: bool,
    /// Why the artifact could not be evaluated. Always non-compliant when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EvaluationError>,
    #[serde(default)]
    pub handlers: Vec<HandlerVerdict>,
    #[serde(default)]
    pub duration_ms: i64,
}

impl PerArtifactOutcome {
    /// Outcome for an artifact whose evaluation completed.
    pub fn evaluated(artifact: CodeBuildInput, handlers: Vec<HandlerVerdict>, duration_ms: i64) -> Self {
        let is_compliant = !handlers.is_empty() && handlers.iter().all(|h| h.is_compliant);
        Self {
            artifact,
            is_compliant,
            error: None,
            handlers,
            duration_ms,
        }
    }

    /// Fail-closed outcome for an artifact whose evaluation errored.
    pub fn failed(artifact: CodeBuildInput, error: EvaluationError, duration_ms: i64) -> Self {
        Self {
            artifact,
            is_compliant: false,
            error: Some(error),
            handlers: vec![],
            duration_ms,
        }
    }
}

/// Workflow state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Start,
    FanOut,
    Aggregate,
    Succeeded,
    Failed,
}

impl WorkflowState {
    /// Terminal states end the run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowFailure {
    /// The input document could not be parsed or validated. No artifact was evaluated.
    InvalidInput { message: String },
    /// At least one artifact was non-compliant (or could not be evaluated).
    NonCompliant { artifacts: Vec<CodeBuildInput> },
    /// Nothing to evaluate and the empty-input policy rejects that.
    NoArtifacts,
    /// Cancelled from outside before the verdict was reached.
    Cancelled,
    /// The overall workflow timeout elapsed.
    TimedOut { timeout_ms: u64 },
}

impl fmt::Display for WorkflowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { message } => write!(f, "invalid workflow input: {message}"),
            Self::NonCompliant { artifacts } => {
                write!(f, "{} artifact(s) not compliant", artifacts.len())
            }
            Self::NoArtifacts => write!(f, "no artifacts to evaluate"),
            Self::Cancelled => write!(f, "workflow cancelled"),
            Self::TimedOut { timeout_ms } => write!(f, "workflow exceeded {timeout_ms}ms"),
        }
    }
}

/// Everything an operator needs to diagnose one run.
///
/// The pipeline only consumes `state`; the rest is for humans.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct WorkflowReport {
    pub run_id: String,
    pub state: WorkflowState,
    pub transitions: Vec<WorkflowState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_pipeline_execution_id: Option<String>,
    pub outcomes: Vec<PerArtifactOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregateReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<WorkflowFailure>,
    pub started_at_ms: i64,
    pub finished_at_ms: i64,
}

impl WorkflowReport {
    /// True iff the pipeline may proceed.
    pub fn succeeded(&self) -> bool {
        self.state == WorkflowState::Succeeded
    }
}
