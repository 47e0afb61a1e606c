//! Bounded polling of result documents that materialise asynchronously.

use std::sync::Arc;

use async_trait::async_trait;
use gate_core::backoff::BackoffPolicy;
use gate_core::error::EvaluationError;
use reqwest::StatusCode;
use thiserror::Error;

/// Why a single fetch did not yield a document. Every variant is retryable:
/// a result that is not written yet looks exactly like a transient failure.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("status {0}")]
    Status(u16),
    #[error("transport: {0}")]
    Transport(String),
    #[error("body is not JSON: {0}")]
    Body(String),
}

/// Source of result documents addressed by URL.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<serde_json::Value, FetchFailure>;
}

/// Plain `GET`; result URLs are pre-authorised and need no signing.
#[derive(Debug, Clone)]
pub struct HttpDocumentSource {
    http: reqwest::Client,
}

impl HttpDocumentSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch(&self, url: &str) -> Result<serde_json::Value, FetchFailure> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;
        if resp.status() != StatusCode::OK {
            return Err(FetchFailure::Status(resp.status().as_u16()));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| FetchFailure::Body(e.to_string()))
    }
}

/// Retries a [`DocumentSource`] under a [`BackoffPolicy`].
#[derive(Clone)]
pub struct PollingFetcher {
    source: Arc<dyn DocumentSource>,
    policy: BackoffPolicy,
}

impl PollingFetcher {
    pub fn new(source: Arc<dyn DocumentSource>, policy: BackoffPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Makes at most `max_attempts` requests, sleeping
    /// `initial * multiplier^n` after failed attempt `n`. The sleep is a
    /// cooperative suspension, so other evaluations keep running.
    pub async fn fetch_when_ready(
        &self,
        handler: &str,
        url: &str,
    ) -> Result<serde_json::Value, EvaluationError> {
        let mut attempt: u32 = 0;
        loop {
            match self.source.fetch(url).await {
                Ok(doc) => {
                    tracing::debug!(handler, attempt = attempt + 1, "result document ready");
                    return Ok(doc);
                }
                Err(failure) => {
                    attempt += 1;
                    if !self.policy.should_retry(attempt) {
                        tracing::warn!(
                            handler,
                            attempts = attempt,
                            last_error = %failure,
                            "result document never became available"
                        );
                        return Err(EvaluationError::PollTimeout {
                            handler: handler.to_string(),
                            attempts: attempt,
                            last_error: failure.to_string(),
                        });
                    }
                    let delay = self.policy.delay_after(attempt - 1);
                    tracing::debug!(
                        handler,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "result not ready; backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
