//! Error taxonomy.
//!
//! Every [`EvaluationError`] is scoped to one artifact and is recovered at the
//! evaluator boundary as a non-compliant outcome. [`WorkflowInputError`] is the
//! only error that stops a whole run, and it does so before fan-out.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-artifact evaluation failure.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationError {
    /// Artifact content could not be read (or was not JSON).
    #[error("artifact s3://{bucket}/{key} unavailable: {reason}")]
    ArtifactUnavailable {
        bucket: String,
        key: String,
        reason: String,
    },

    /// The endpoint refused the submission or could not be reached.
    #[error("submission rejected (status {}): {reason}", .status.map_or_else(|| "none".to_string(), |s| s.to_string()))]
    SubmissionRejected { status: Option<u16>, reason: String },

    /// The endpoint accepted the submission but its body was unusable.
    #[error("malformed evaluation response: {reason}")]
    MalformedResponse { reason: String },

    /// The result document never became readable.
    #[error("result for handler {handler} not available after {attempts} attempt(s): {last_error}")]
    PollTimeout {
        handler: String,
        attempts: u32,
        last_error: String,
    },

    /// The result document lacks the verdict field.
    #[error("malformed result document: {reason}")]
    MalformedResult { reason: String },

    /// The per-artifact time budget elapsed.
    #[error("evaluation exceeded {timeout_ms}ms")]
    EvaluationTimedOut { timeout_ms: u64 },

    /// The evaluation task died before producing an outcome.
    #[error("evaluation aborted: {reason}")]
    Aborted { reason: String },
}

impl EvaluationError {
    /// Short machine-friendly name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ArtifactUnavailable { .. } => "artifact_unavailable",
            Self::SubmissionRejected { .. } => "submission_rejected",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::PollTimeout { .. } => "poll_timeout",
            Self::MalformedResult { .. } => "malformed_result",
            Self::EvaluationTimedOut { .. } => "evaluation_timed_out",
            Self::Aborted { .. } => "aborted",
        }
    }
}

/// The top-level input could not be turned into a `WorkflowInput`.
#[derive(Debug, Error)]
pub enum WorkflowInputError {
    #[error("workflow input is not valid JSON for the expected shape: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("workflow input rejected: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
