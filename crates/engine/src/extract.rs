//! Verdict extraction from result documents.

use gate_core::error::EvaluationError;
use serde_json::Value;

/// Namespace the reference policy engine writes its evaluation under.
pub const DEFAULT_RESULT_NAMESPACE: &str = "EvalEngineLambdalith";

/// Reads `{<namespace>: {Evaluation: {IsCompliant: bool}}}`.
///
/// With no namespace configured, a top-level `Evaluation` is accepted, or the
/// single top-level object that carries one. Anything else is malformed.
#[derive(Debug, Clone, Default)]
pub struct ComplianceExtractor {
    namespace: Option<String>,
}

impl ComplianceExtractor {
    pub fn new(namespace: Option<String>) -> Self {
        Self { namespace }
    }

    pub fn extract(&self, doc: &Value) -> Result<bool, EvaluationError> {
        let scope = match &self.namespace {
            Some(ns) => doc
                .get(ns)
                .ok_or_else(|| malformed(format!("missing namespace '{ns}'")))?,
            None => detect_scope(doc)?,
        };

        let evaluation = scope
            .get("Evaluation")
            .ok_or_else(|| malformed("missing 'Evaluation'".into()))?;
        match evaluation.get("IsCompliant") {
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(malformed(format!("'IsCompliant' is not a boolean: {other}"))),
            None => Err(malformed("missing 'Evaluation.IsCompliant'".into())),
        }
    }
}

fn detect_scope(doc: &Value) -> Result<&Value, EvaluationError> {
    if doc.get("Evaluation").is_some() {
        return Ok(doc);
    }
    let obj = doc
        .as_object()
        .ok_or_else(|| malformed("result document is not an object".into()))?;
    let mut candidates = obj.values().filter(|v| v.get("Evaluation").is_some());
    match (candidates.next(), candidates.next()) {
        (Some(scope), None) => Ok(scope),
        (None, _) => Err(malformed("no namespace carries 'Evaluation'".into())),
        (Some(_), Some(_)) => Err(malformed(
            "several namespaces carry 'Evaluation'; configure a result namespace".into(),
        )),
    }
}

fn malformed(reason: String) -> EvaluationError {
    EvaluationError::MalformedResult { reason }
}
