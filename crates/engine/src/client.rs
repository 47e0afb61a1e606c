//! Submission of one artifact to the evaluation endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use gate_core::api::{EvaluationRequest, EvaluationResponse};
use gate_core::error::EvaluationError;
use gate_core::model::{CodeBuildInput, Context};
use reqwest::{StatusCode, Url};

use crate::signing::RequestSigner;
use crate::store::ObjectStore;

/// Longest slice of an error body kept for diagnostics.
const BODY_SNIPPET_LIMIT: usize = 512;

/// Submits one artifact for evaluation.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(
        &self,
        artifact: &CodeBuildInput,
        context: &Context,
    ) -> Result<EvaluationResponse, EvaluationError>;
}

/// Reads the artifact, wraps it with the shared context and posts it,
/// signed with the caller's identity.
///
/// One attempt only. A rejection means the request itself is wrong, so
/// retrying here would not help.
#[derive(Clone)]
pub struct SignedRequestClient {
    http: reqwest::Client,
    endpoint: Url,
    signer: RequestSigner,
    store: Arc<dyn ObjectStore>,
}

impl SignedRequestClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: Url,
        signer: RequestSigner,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            http,
            endpoint,
            signer,
            store,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn load_artifact(&self, artifact: &CodeBuildInput) -> Result<serde_json::Value, EvaluationError> {
        let unavailable = |reason: String| EvaluationError::ArtifactUnavailable {
            bucket: artifact.bucket.clone(),
            key: artifact.key.clone(),
            reason,
        };
        let bytes = self
            .store
            .get(&artifact.bucket, &artifact.key)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| unavailable(format!("content is not JSON: {e}")))
    }
}

#[async_trait]
impl Submitter for SignedRequestClient {
    async fn submit(
        &self,
        artifact: &CodeBuildInput,
        context: &Context,
    ) -> Result<EvaluationResponse, EvaluationError> {
        let input = self.load_artifact(artifact).await?;

        let request = EvaluationRequest {
            context: context.clone(),
            input,
        };
        let body = serde_json::to_vec(&request).map_err(|e| EvaluationError::SubmissionRejected {
            status: None,
            reason: format!("serialize request: {e}"),
        })?;

        let headers = self.signer.sign(
            "POST",
            &self.endpoint,
            &[("content-type", "application/json")],
            &body,
            Utc::now(),
        );

        let mut req = self
            .http
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            req = req.header(name, value);
        }

        tracing::debug!(artifact = %artifact, endpoint = %self.endpoint, "submitting artifact");

        let resp = req
            .body(body)
            .send()
            .await
            .map_err(|e| EvaluationError::SubmissionRejected {
                status: None,
                reason: format!("request failed: {e}"),
            })?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| EvaluationError::SubmissionRejected {
                status: Some(status.as_u16()),
                reason: format!("read body: {e}"),
            })?;

        if status != StatusCode::OK {
            return Err(EvaluationError::SubmissionRejected {
                status: Some(status.as_u16()),
                reason: snippet(&bytes),
            });
        }

        EvaluationResponse::from_body(status.as_u16(), &bytes)
            .map_err(|reason| EvaluationError::MalformedResponse { reason })
    }
}

fn snippet(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut end = text.len().min(BODY_SNIPPET_LIMIT);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
