use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gate_core::error::EvaluationError;
use gate_core::model::{CodeBuildInput, Context, PerArtifactOutcome};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::evaluator::ArtifactEvaluator;

/// Concurrency and time limits for one fan-out.
#[derive(Debug, Clone)]
pub struct FanOutPolicy {
    /// Evaluations in flight at once. `1` runs artifacts one after another.
    pub concurrency: usize,
    /// Budget for a single artifact, measured from when it starts running.
    pub artifact_timeout: Option<Duration>,
}

impl Default for FanOutPolicy {
    fn default() -> Self {
        Self {
            concurrency: 4,
            artifact_timeout: None,
        }
    }
}

/// Runs the evaluator over every artifact, one isolated task each.
///
/// Tasks share only the immutable context and the evaluator. A task that
/// panics or times out turns into a non-compliant outcome for its own
/// artifact; siblings keep running. Dropping the returned future aborts
/// every task still in flight.
#[derive(Clone)]
pub struct FanOutCoordinator {
    evaluator: Arc<ArtifactEvaluator>,
    policy: FanOutPolicy,
}

impl FanOutCoordinator {
    pub fn new(evaluator: Arc<ArtifactEvaluator>, policy: FanOutPolicy) -> Self {
        Self { evaluator, policy }
    }

    pub fn policy(&self) -> &FanOutPolicy {
        &self.policy
    }

    /// Returns exactly one outcome per artifact, in input order.
    pub async fn run(&self, artifacts: &[CodeBuildInput], context: Arc<Context>) -> Vec<PerArtifactOutcome> {
        if artifacts.is_empty() {
            return vec![];
        }

        let permits = Arc::new(Semaphore::new(self.policy.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut index_of = HashMap::with_capacity(artifacts.len());

        for (idx, artifact) in artifacts.iter().cloned().enumerate() {
            let evaluator = Arc::clone(&self.evaluator);
            let context = Arc::clone(&context);
            let permits = Arc::clone(&permits);
            let limit = self.policy.artifact_timeout;

            let handle = tasks.spawn(
                async move {
                    // The semaphore is never closed.
                    let _permit = permits.acquire_owned().await.ok();
                    let outcome = match limit {
                        Some(limit) => {
                            match tokio::time::timeout(limit, evaluator.evaluate(&artifact, &context)).await {
                                Ok(outcome) => outcome,
                                Err(_) => {
                                    let timeout_ms = limit.as_millis() as u64;
                                    tracing::warn!(artifact = %artifact, timeout_ms, "artifact evaluation timed out");
                                    PerArtifactOutcome::failed(
                                        artifact.clone(),
                                        EvaluationError::EvaluationTimedOut { timeout_ms },
                                        timeout_ms as i64,
                                    )
                                }
                            }
                        }
                        None => evaluator.evaluate(&artifact, &context).await,
                    };
                    (idx, outcome)
                }
                .in_current_span(),
            );
            index_of.insert(handle.id(), idx);
        }

        let mut slots: Vec<Option<PerArtifactOutcome>> = vec![None; artifacts.len()];
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (idx, outcome))) => slots[idx] = Some(outcome),
                Err(e) => {
                    if let Some(&idx) = index_of.get(&e.id()) {
                        tracing::error!(artifact = %artifacts[idx], error = %e, "evaluation task died");
                        slots[idx] = Some(PerArtifactOutcome::failed(
                            artifacts[idx].clone(),
                            EvaluationError::Aborted {
                                reason: e.to_string(),
                            },
                            0,
                        ));
                    }
                }
            }
        }

        slots
            .into_iter()
            .zip(artifacts)
            .map(|(slot, artifact)| {
                slot.unwrap_or_else(|| {
                    PerArtifactOutcome::failed(
                        artifact.clone(),
                        EvaluationError::Aborted {
                            reason: "no outcome recorded".into(),
                        },
                        0,
                    )
                })
            })
            .collect()
    }
}
