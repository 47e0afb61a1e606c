//! Wire documents exchanged with the evaluation service.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Context;

/// Body posted to the evaluation endpoint.
///
/// `input` is the parsed content of the artifact, not its storage reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct EvaluationRequest {
    pub context: Context,
    pub input: serde_json::Value,
}

/// One result-location handle returned by the evaluation service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct OutputHandler {
    pub presigned_url: String,
}

/// Acknowledgement that an evaluation was accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ControlBrokerEvaluation {
    /// Keyed by output-handler name (usually a policy-engine identifier).
    pub output_handlers: BTreeMap<String, OutputHandler>,
}

/// Body of a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct EvaluationResponseBody {
    pub control_broker_evaluation: ControlBrokerEvaluation,
}

/// Submission response with the HTTP status it arrived with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct EvaluationResponse {
    pub status_code: u16,
    pub response: EvaluationResponseBody,
}

impl EvaluationResponse {
    /// Parses an endpoint body.
    ///
    /// Accepts the bare body as well as one already wrapped in `Response`.
    /// A response without any output handler is rejected: there would be
    /// nothing to poll, and treating that as a pass would fail open.
    pub fn from_body(status_code: u16, body: &[u8]) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| format!("response is not JSON: {e}"))?;
        let inner = match value.get("Response") {
            Some(wrapped) => wrapped.clone(),
            None => value,
        };
        let response: EvaluationResponseBody = serde_json::from_value(inner)
            .map_err(|e| format!("unexpected response shape: {e}"))?;
        if response.control_broker_evaluation.output_handlers.is_empty() {
            return Err("response carries no output handlers".into());
        }
        Ok(Self {
            status_code,
            response,
        })
    }

    /// Output handlers in name order.
    pub fn output_handlers(&self) -> impl Iterator<Item = (&str, &OutputHandler)> {
        self.response
            .control_broker_evaluation
            .output_handlers
            .iter()
            .map(|(name, handler)| (name.as_str(), handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_wrapped_bodies() {
        let bare = br#"{"ControlBrokerEvaluation":{"OutputHandlers":{"OPA":{"PresignedUrl":"https://r/1"}}}}"#;
        let wrapped = br#"{"Response":{"ControlBrokerEvaluation":{"OutputHandlers":{"OPA":{"PresignedUrl":"https://r/1"}}}}}"#;

        let a = EvaluationResponse::from_body(200, bare).unwrap();
        let b = EvaluationResponse::from_body(200, wrapped).unwrap();
        assert_eq!(a, b);
        let handlers: Vec<_> = a.output_handlers().collect();
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].0, "OPA");
        assert_eq!(handlers[0].1.presigned_url, "https://r/1");
    }

    #[test]
    fn rejects_response_without_handlers() {
        let body = br#"{"ControlBrokerEvaluation":{"OutputHandlers":{}}}"#;
        let err = EvaluationResponse::from_body(200, body).unwrap_err();
        assert!(err.contains("no output handlers"));
    }

    #[test]
    fn rejects_non_json() {
        assert!(EvaluationResponse::from_body(200, b"<html>").is_err());
    }

    #[test]
    fn request_serializes_with_pascal_case() {
        let req = EvaluationRequest {
            context: Context {
                environment_evaluation: "Prod".into(),
                ..Default::default()
            },
            input: serde_json::json!({"Resources": {}}),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["Context"]["EnvironmentEvaluation"], "Prod");
        assert_eq!(v["Input"]["Resources"], serde_json::json!({}));
    }
}
