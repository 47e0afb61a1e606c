use std::sync::Arc;

use gate_core::error::EvaluationError;
use gate_core::model::{CodeBuildInput, Context, HandlerVerdict, PerArtifactOutcome};
use gate_core::now_ms;
use tracing::Instrument;

use crate::client::Submitter;
use crate::extract::ComplianceExtractor;
use crate::poller::PollingFetcher;

/// Per-artifact unit of work: submit, poll every output handler, extract.
#[derive(Clone)]
pub struct ArtifactEvaluator {
    submitter: Arc<dyn Submitter>,
    fetcher: PollingFetcher,
    extractor: ComplianceExtractor,
}

impl ArtifactEvaluator {
    pub fn new(
        submitter: Arc<dyn Submitter>,
        fetcher: PollingFetcher,
        extractor: ComplianceExtractor,
    ) -> Self {
        Self {
            submitter,
            fetcher,
            extractor,
        }
    }

    /// Never fails: any error becomes a non-compliant outcome carrying it.
    pub async fn evaluate(&self, artifact: &CodeBuildInput, context: &Context) -> PerArtifactOutcome {
        let span = tracing::info_span!("evaluate", artifact = %artifact);
        async {
            let started = now_ms();
            let result = self.try_evaluate(artifact, context).await;
            let duration_ms = now_ms() - started;
            match result {
                Ok(handlers) => {
                    let outcome = PerArtifactOutcome::evaluated(artifact.clone(), handlers, duration_ms);
                    tracing::info!(is_compliant = outcome.is_compliant, duration_ms, "artifact evaluated");
                    outcome
                }
                Err(error) => {
                    tracing::warn!(kind = error.kind(), error = %error, "artifact evaluation failed");
                    PerArtifactOutcome::failed(artifact.clone(), error, duration_ms)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn try_evaluate(
        &self,
        artifact: &CodeBuildInput,
        context: &Context,
    ) -> Result<Vec<HandlerVerdict>, EvaluationError> {
        let response = self.submitter.submit(artifact, context).await?;

        let mut verdicts = Vec::new();
        for (handler, location) in response.output_handlers() {
            let doc = self
                .fetcher
                .fetch_when_ready(handler, &location.presigned_url)
                .await?;
            let is_compliant = self.extractor.extract(&doc)?;
            tracing::debug!(handler, is_compliant, "handler verdict");
            verdicts.push(HandlerVerdict {
                handler: handler.to_string(),
                is_compliant,
            });
        }
        Ok(verdicts)
    }
}
