#![forbid(unsafe_code)]

//! Compliance gate CLI: evaluates a build stage's artifacts and exits with
//! the gate decision.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gate_core::model::WorkflowReport;
use gate_core::validation::parse_workflow_input;
use gate_engine::{
    ArtifactEvaluator, ComplianceExtractor, Credentials, FanOutCoordinator, FsObjectStore,
    HttpDocumentSource, ObjectStore, PollingFetcher, RequestSigner, S3ObjectStore,
    SignedRequestClient, WorkflowDriver,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use crate::config::{GateConfig, StoreKind};

const EXIT_FAILED: u8 = 1;
const EXIT_OPERATOR_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "gatectl", version)]
struct Cli {
    /// Log level (env-filter syntax).
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate every artifact of an input document and exit with the verdict
    Run {
        /// Workflow input document (JSON).
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value = "gate.toml")]
        config: PathBuf,

        /// Write the full run report here as JSON.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Overrides endpoint.url.
        #[arg(long)]
        endpoint: Option<String>,

        /// Overrides fan_out.concurrency.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Overrides workflow.timeout_ms.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Parse and validate an input document without evaluating anything
    Check {
        #[arg(long)]
        input: PathBuf,
    },

    /// Write a default config file
    Init {
        #[arg(long, default_value = "gate.toml")]
        config: PathBuf,

        #[arg(long)]
        endpoint: Option<String>,

        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&cli.log))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.cmd {
        Command::Run {
            input,
            config,
            report,
            endpoint,
            concurrency,
            timeout_ms,
        } => {
            let overrides = Overrides {
                endpoint,
                concurrency,
                timeout_ms,
            };
            run(&input, &config, report.as_deref(), overrides).await
        }
        Command::Check { input } => check(&input).await,
        Command::Init {
            config,
            endpoint,
            force,
        } => init(&config, endpoint.as_deref(), force),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "gatectl failed");
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_OPERATOR_ERROR)
        }
    }
}

struct Overrides {
    endpoint: Option<String>,
    concurrency: Option<usize>,
    timeout_ms: Option<u64>,
}

impl Overrides {
    fn apply(self, cfg: &mut GateConfig) {
        if let Some(url) = self.endpoint {
            cfg.endpoint.url = url;
        }
        if let Some(n) = self.concurrency {
            cfg.fan_out.concurrency = n;
        }
        if let Some(ms) = self.timeout_ms {
            cfg.workflow.timeout_ms = Some(ms);
        }
    }
}

async fn run(
    input: &Path,
    config: &Path,
    report_path: Option<&Path>,
    overrides: Overrides,
) -> anyhow::Result<ExitCode> {
    let mut cfg = GateConfig::load_or_default(config)?;
    overrides.apply(&mut cfg);
    cfg.validate()?;

    let raw = tokio::fs::read(input)
        .await
        .with_context(|| format!("read {}", input.display()))?;
    let driver = build_driver(&cfg)?;

    tracing::info!(
        endpoint = %cfg.endpoint.url,
        concurrency = cfg.fan_out.concurrency,
        max_attempts = cfg.poll.max_attempts,
        worst_case_poll_ms = cfg.poll.worst_case_wait().as_millis() as u64,
        "gate starting"
    );

    let cancel = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::warn!("interrupt received; cancelling run"),
            // No signal handler means no way to be interrupted.
            Err(_) => futures::future::pending::<()>().await,
        }
    };
    let report = driver.run_document_until(&raw, cancel).await;

    if let Some(path) = report_path {
        write_report(path, &report).await?;
    }
    print_summary(&report);

    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    })
}

fn build_driver(cfg: &GateConfig) -> anyhow::Result<WorkflowDriver> {
    let credentials = Credentials::from_env().context("resolve caller credentials")?;
    let region = cfg.endpoint.resolved_region()?;
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()
        .context("build http client")?;

    let store: Arc<dyn ObjectStore> = match cfg.artifacts.store {
        StoreKind::Fs => {
            let root = cfg.artifacts.root.clone().unwrap_or_default();
            Arc::new(FsObjectStore::new(root))
        }
        StoreKind::S3 => Arc::new(S3ObjectStore::new(
            http.clone(),
            RequestSigner::new(credentials.clone(), region.clone(), "s3"),
            cfg.artifacts.s3_endpoint.clone(),
        )),
    };

    let client = SignedRequestClient::new(
        http.clone(),
        cfg.endpoint.parsed_url()?,
        RequestSigner::new(credentials, region, cfg.endpoint.service.clone()),
        store,
    );
    let evaluator = ArtifactEvaluator::new(
        Arc::new(client),
        PollingFetcher::new(Arc::new(HttpDocumentSource::new(http)), cfg.poll.clone()),
        ComplianceExtractor::new(cfg.workflow.namespace()),
    );
    Ok(WorkflowDriver::new(
        FanOutCoordinator::new(Arc::new(evaluator), cfg.fan_out.policy()),
        cfg.aggregation.aggregator(),
        cfg.workflow.timeout(),
    ))
}

async fn write_report(path: &Path, report: &WorkflowReport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    let json = serde_json::to_vec_pretty(report).context("serialize report")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn print_summary(report: &WorkflowReport) {
    match &report.failure {
        None => println!("Succeeded ({} artifact(s))", report.outcomes.len()),
        Some(failure) => println!("Failed: {failure}"),
    }
    for o in &report.outcomes {
        let verdict = if o.is_compliant { "compliant" } else { "NON-COMPLIANT" };
        match &o.error {
            Some(e) => println!("- {} {verdict} ({e})", o.artifact),
            None => println!("- {} {verdict}", o.artifact),
        }
    }
}

async fn check(input: &Path) -> anyhow::Result<ExitCode> {
    let raw = tokio::fs::read(input)
        .await
        .with_context(|| format!("read {}", input.display()))?;
    match parse_workflow_input(&raw) {
        Ok(parsed) => {
            println!(
                "OK: {} artifact(s), environment '{}'",
                parsed.code_build_inputs.len(),
                parsed.context.environment_evaluation
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("Invalid: {e}");
            Ok(ExitCode::from(EXIT_FAILED))
        }
    }
}

fn init(path: &Path, endpoint: Option<&str>, force: bool) -> anyhow::Result<ExitCode> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to replace it)", path.display());
    }
    let cfg = GateConfig::default_with_endpoint(endpoint.unwrap_or_default());
    cfg.save_to(path)?;
    println!("Wrote {}", path.display());
    Ok(ExitCode::SUCCESS)
}
