//! Test doubles shared by the engine integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gate_core::api::EvaluationResponse;
use gate_core::backoff::BackoffPolicy;
use gate_core::error::EvaluationError;
use gate_core::model::{CodeBuildInput, Context};
use gate_engine::{
    ArtifactEvaluator, ComplianceExtractor, DocumentSource, FetchFailure, PollingFetcher,
    Submitter, DEFAULT_RESULT_NAMESPACE,
};
use serde_json::{json, Value};
use tokio::time::Instant;

/// Builds an accepted submission whose handlers point at `urls`.
pub fn accepted(handlers: &[(&str, &str)]) -> EvaluationResponse {
    let map: serde_json::Map<String, Value> = handlers
        .iter()
        .map(|(name, url)| (name.to_string(), json!({ "PresignedUrl": url })))
        .collect();
    let body = json!({ "ControlBrokerEvaluation": { "OutputHandlers": map } });
    EvaluationResponse::from_body(200, body.to_string().as_bytes()).unwrap()
}

pub fn verdict_doc(is_compliant: bool) -> Value {
    json!({ DEFAULT_RESULT_NAMESPACE: { "Evaluation": { "IsCompliant": is_compliant } } })
}

pub fn context() -> Context {
    serde_json::from_value(json!({
        "EnvironmentEvaluation": "Prod",
        "PipelineOwnershipMetadata": { "PipelineId": "App1" }
    }))
    .unwrap()
}

pub fn fast_policy(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy {
        max_attempts,
        initial_delay_ms: 10,
        multiplier: 2.0,
        max_delay_ms: None,
    }
}

type SubmitFn = dyn Fn(&CodeBuildInput) -> Result<EvaluationResponse, EvaluationError> + Send + Sync;

/// Submitter driven by a closure, with optional latency and in-flight tracking.
pub struct FnSubmitter {
    respond: Box<SubmitFn>,
    delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub contexts: Mutex<Vec<Context>>,
}

impl FnSubmitter {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&CodeBuildInput) -> Result<EvaluationResponse, EvaluationError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            contexts: Mutex::new(vec![]),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Submitter for FnSubmitter {
    async fn submit(
        &self,
        artifact: &CodeBuildInput,
        context: &Context,
    ) -> Result<EvaluationResponse, EvaluationError> {
        self.contexts.lock().unwrap().push(context.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.respond)(artifact)
    }
}

/// Serves documents by URL after `not_ready` failed fetches per URL.
/// URLs without a document fail forever.
#[derive(Default)]
pub struct MapSource {
    docs: HashMap<String, Value>,
    not_ready: u32,
    pub fetches: Mutex<Vec<(String, Instant)>>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doc(mut self, url: &str, doc: Value) -> Self {
        self.docs.insert(url.to_string(), doc);
        self
    }

    pub fn not_ready_for(mut self, attempts: u32) -> Self {
        self.not_ready = attempts;
        self
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().iter().filter(|(u, _)| u == url).count()
    }

    pub fn fetch_times(&self, url: &str) -> Vec<Instant> {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, t)| *t)
            .collect()
    }
}

#[async_trait]
impl DocumentSource for MapSource {
    async fn fetch(&self, url: &str) -> Result<Value, FetchFailure> {
        let seen = {
            let mut fetches = self.fetches.lock().unwrap();
            fetches.push((url.to_string(), Instant::now()));
            fetches.iter().filter(|(u, _)| u == url).count() as u32
        };
        if seen <= self.not_ready {
            return Err(FetchFailure::Status(404));
        }
        self.docs.get(url).cloned().ok_or(FetchFailure::Status(404))
    }
}

pub fn evaluator(submitter: Arc<dyn Submitter>, source: Arc<MapSource>, policy: BackoffPolicy) -> ArtifactEvaluator {
    ArtifactEvaluator::new(
        submitter,
        PollingFetcher::new(source, policy),
        ComplianceExtractor::new(Some(DEFAULT_RESULT_NAMESPACE.to_string())),
    )
}

/// Submitter that accepts every artifact with one handler at `mem://<key>`.
pub fn per_key_submitter() -> FnSubmitter {
    FnSubmitter::new(|artifact| {
        let url = format!("mem://{}", artifact.key);
        Ok(accepted(&[("OPA", url.as_str())]))
    })
}
