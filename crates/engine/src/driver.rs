//! Top-level workflow: `Start -> FanOut -> Aggregate -> {Succeeded | Failed}`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gate_core::aggregate::{AggregateReport, ComplianceAggregator};
use gate_core::model::{
    PerArtifactOutcome, WorkflowFailure, WorkflowInput, WorkflowReport, WorkflowState,
};
use gate_core::validation::{parse_workflow_input, validate_workflow_input, Decision};
use gate_core::{new_ulid, now_ms};

use crate::fanout::FanOutCoordinator;

/// Drives one workflow run to a terminal state.
#[derive(Clone)]
pub struct WorkflowDriver {
    coordinator: FanOutCoordinator,
    aggregator: ComplianceAggregator,
    workflow_timeout: Option<Duration>,
}

impl WorkflowDriver {
    pub fn new(
        coordinator: FanOutCoordinator,
        aggregator: ComplianceAggregator,
        workflow_timeout: Option<Duration>,
    ) -> Self {
        Self {
            coordinator,
            aggregator,
            workflow_timeout,
        }
    }

    /// Parses the raw input document, then runs it.
    pub async fn run_document(&self, raw: &[u8]) -> WorkflowReport {
        self.run_document_until(raw, futures::future::pending()).await
    }

    /// Like [`run_document`](Self::run_document), abandoning the run when `cancel` resolves.
    pub async fn run_document_until<F>(&self, raw: &[u8], cancel: F) -> WorkflowReport
    where
        F: Future<Output = ()>,
    {
        let run = RunRecorder::start();
        match parse_workflow_input(raw) {
            Ok(input) => self.execute(run, input, cancel).await,
            Err(e) => run.fail(WorkflowFailure::InvalidInput { message: e.to_string() }),
        }
    }

    pub async fn run(&self, input: WorkflowInput) -> WorkflowReport {
        self.run_until(input, futures::future::pending()).await
    }

    /// Runs an already-parsed input; it is still validated before fan-out.
    pub async fn run_until<F>(&self, input: WorkflowInput, cancel: F) -> WorkflowReport
    where
        F: Future<Output = ()>,
    {
        let run = RunRecorder::start();
        let check = validate_workflow_input(&input);
        if check.decision == Decision::Block {
            return run.fail(WorkflowFailure::InvalidInput {
                message: check.violations.join("; "),
            });
        }
        self.execute(run, input, cancel).await
    }

    async fn execute<F>(&self, mut run: RunRecorder, input: WorkflowInput, cancel: F) -> WorkflowReport
    where
        F: Future<Output = ()>,
    {
        run.execution_id = input.code_pipeline_execution_id.clone();
        tracing::info!(
            run_id = %run.run_id,
            artifacts = input.code_build_inputs.len(),
            execution_id = ?run.execution_id,
            "workflow started"
        );

        run.transition(WorkflowState::FanOut);
        let context = Arc::new(input.context);
        let fan_out = self.coordinator.run(&input.code_build_inputs, context);

        let limit = self.workflow_timeout;
        let bounded = async move {
            match limit {
                Some(limit) => tokio::time::timeout(limit, fan_out).await.map_err(|_| {
                    WorkflowFailure::TimedOut {
                        timeout_ms: limit.as_millis() as u64,
                    }
                }),
                None => Ok(fan_out.await),
            }
        };

        // Losing the race drops the fan-out, which aborts every evaluation in flight.
        let collected = tokio::select! {
            biased;
            _ = cancel => Err(WorkflowFailure::Cancelled),
            result = bounded => result,
        };

        let outcomes = match collected {
            Ok(outcomes) => outcomes,
            Err(failure) => return run.fail(failure),
        };

        run.transition(WorkflowState::Aggregate);
        let report = self.aggregator.aggregate(&outcomes);
        tracing::info!(
            run_id = %run.run_id,
            verdict = report.verdict,
            total = report.total,
            compliant = report.compliant,
            "aggregated"
        );

        let failure = match (report.verdict, outcomes.is_empty()) {
            (true, _) => None,
            (false, true) => Some(WorkflowFailure::NoArtifacts),
            (false, false) => Some(WorkflowFailure::NonCompliant {
                artifacts: report.non_compliant.clone(),
            }),
        };
        run.outcomes = outcomes;
        run.aggregate = Some(report);
        match failure {
            None => run.finish(WorkflowState::Succeeded, None),
            Some(failure) => run.fail(failure),
        }
    }
}

struct RunRecorder {
    run_id: String,
    execution_id: Option<String>,
    transitions: Vec<WorkflowState>,
    outcomes: Vec<PerArtifactOutcome>,
    aggregate: Option<AggregateReport>,
    started_at_ms: i64,
}

impl RunRecorder {
    fn start() -> Self {
        Self {
            run_id: new_ulid().to_string(),
            execution_id: None,
            transitions: vec![WorkflowState::Start],
            outcomes: vec![],
            aggregate: None,
            started_at_ms: now_ms(),
        }
    }

    fn current(&self) -> WorkflowState {
        self.transitions.last().copied().unwrap_or(WorkflowState::Start)
    }

    fn transition(&mut self, to: WorkflowState) {
        tracing::debug!(run_id = %self.run_id, from = ?self.current(), to = ?to, "transition");
        self.transitions.push(to);
    }

    fn fail(self, failure: WorkflowFailure) -> WorkflowReport {
        tracing::warn!(run_id = %self.run_id, reason = %failure, "workflow failed");
        self.finish(WorkflowState::Failed, Some(failure))
    }

    fn finish(mut self, state: WorkflowState, failure: Option<WorkflowFailure>) -> WorkflowReport {
        self.transition(state);
        if state == WorkflowState::Succeeded {
            tracing::info!(run_id = %self.run_id, "workflow succeeded");
        }
        WorkflowReport {
            run_id: self.run_id,
            state,
            transitions: self.transitions,
            code_pipeline_execution_id: self.execution_id,
            outcomes: self.outcomes,
            aggregate: self.aggregate,
            failure,
            started_at_ms: self.started_at_ms,
            finished_at_ms: now_ms(),
        }
    }
}
