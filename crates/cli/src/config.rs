use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use gate_core::aggregate::{AggregationRule, ComplianceAggregator, EmptyPolicy};
use gate_core::backoff::BackoffPolicy;
use gate_engine::{FanOutPolicy, DEFAULT_RESULT_NAMESPACE};
use reqwest::Url;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GateConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub poll: BackoffPolicy,
    #[serde(default)]
    pub fan_out: FanOutConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    /// Invoke URL of the evaluation endpoint.
    #[serde(default)]
    pub url: String,
    /// Signing region. Derived from an `execute-api` host when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default = "default_service")]
    pub service: String,
}

fn default_service() -> String {
    "execute-api".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            region: None,
            service: default_service(),
        }
    }
}

impl EndpointConfig {
    pub fn parsed_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url).with_context(|| format!("endpoint.url '{}'", self.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("endpoint.url must be http(s), got '{}'", url.scheme());
        }
        Ok(url)
    }

    /// `abc123.execute-api.us-east-1.amazonaws.com` signs for `us-east-1`.
    pub fn resolved_region(&self) -> Result<String> {
        if let Some(region) = self.region.as_deref().filter(|r| !r.is_empty()) {
            return Ok(region.to_string());
        }
        let url = self.parsed_url()?;
        let host = url.host_str().unwrap_or_default();
        let labels: Vec<&str> = host.split('.').collect();
        labels
            .iter()
            .position(|l| *l == "execute-api")
            .and_then(|i| labels.get(i + 1))
            .map(|r| r.to_string())
            .with_context(|| format!("cannot derive a region from host '{host}'; set endpoint.region"))
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    S3,
    Fs,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ArtifactsConfig {
    #[serde(default)]
    pub store: StoreKind,
    /// Directory holding one sub-directory per bucket (`fs` store).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    /// Overrides `https://s3.<region>.amazonaws.com` (`s3` store).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_endpoint: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FanOutConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_timeout_ms: Option<u64>,
}

fn default_concurrency() -> usize {
    4
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            artifact_timeout_ms: None,
        }
    }
}

impl FanOutConfig {
    pub fn policy(&self) -> FanOutPolicy {
        FanOutPolicy {
            concurrency: self.concurrency,
            artifact_timeout: self.artifact_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Top-level key of result documents. Empty means detect it.
    #[serde(default = "default_result_namespace")]
    pub result_namespace: String,
}

fn default_result_namespace() -> String {
    DEFAULT_RESULT_NAMESPACE.to_string()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            result_namespace: default_result_namespace(),
        }
    }
}

impl WorkflowConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn namespace(&self) -> Option<String> {
        Some(self.result_namespace.clone()).filter(|ns| !ns.is_empty())
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregationConfig {
    #[serde(default)]
    pub rule: AggregationRule,
    #[serde(default)]
    pub empty: EmptyPolicy,
}

impl AggregationConfig {
    pub fn aggregator(&self) -> ComplianceAggregator {
        ComplianceAggregator::new(self.rule, self.empty)
    }
}

impl GateConfig {
    pub fn default_with_endpoint(url: &str) -> Self {
        Self {
            endpoint: EndpointConfig {
                url: url.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: GateConfig = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    /// A missing file yields the defaults; flags may still fill in the endpoint.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Collects every problem rather than stopping at the first.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.endpoint.url.trim().is_empty() {
            problems.push("endpoint.url is required".to_string());
        } else if let Err(e) = self.endpoint.resolved_region() {
            problems.push(format!("{e:#}"));
        }
        if self.endpoint.service.trim().is_empty() {
            problems.push("endpoint.service must not be empty".to_string());
        }
        if self.artifacts.store == StoreKind::Fs && self.artifacts.root.is_none() {
            problems.push("artifacts.root is required for the fs store".to_string());
        }
        if let Err(e) = self.poll.validate() {
            problems.push(format!("poll: {e}"));
        }
        if self.fan_out.concurrency == 0 {
            problems.push("fan_out.concurrency must be at least 1".to_string());
        }
        if self.fan_out.artifact_timeout_ms == Some(0) {
            problems.push("fan_out.artifact_timeout_ms must be positive".to_string());
        }
        if self.workflow.timeout_ms == Some(0) {
            problems.push("workflow.timeout_ms must be positive".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            bail!("invalid configuration: {}", problems.join("; "))
        }
    }
}
