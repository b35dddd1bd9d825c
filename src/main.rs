use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use kube_job_runner::config::RunnerConfig;
use kube_job_runner::kubernetes::{
    demo_workload, BatchPipeline, CleanupOutcome, KubeOrchestrator, RunReport, WorkloadManifest,
};
use kube_job_runner::logging::{init_structured_logging, LogFormat};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run a multi-stage batch workload as a Kubernetes Job and print its logs
#[derive(Parser, Debug)]
#[command(name = "kube-job-runner")]
#[command(version)]
struct Cli {
    /// Path to the kubeconfig file [env: KUBECONFIG, default: ~/.kube/config]
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Namespace to run the Job in [env: BATCH_NAMESPACE]
    #[arg(short, long)]
    namespace: Option<String>,

    /// YAML workload manifest; the built-in demo workload runs when omitted [env: BATCH_WORKLOAD]
    #[arg(short, long)]
    workload: Option<PathBuf>,

    /// Message the demo init stage hands to the main stage
    #[arg(long, default_value = kube_job_runner::kubernetes::manifest::DEMO_INIT_MESSAGE)]
    message: String,

    /// Seconds between status samples [env: BATCH_POLL_INTERVAL_SECS]
    #[arg(long)]
    poll_interval_secs: Option<u64>,

    /// Give up waiting after this many seconds [env: BATCH_MAX_WAIT_SECS]
    #[arg(long)]
    max_wait_secs: Option<u64>,

    /// Keep the Job and its pods after a successful run
    #[arg(long)]
    keep_resources: bool,

    /// Delete the Job when the run is interrupted with Ctrl-C
    #[arg(long)]
    cleanup_on_cancel: bool,

    /// compact, pretty or json [env: LOG_FORMAT]
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn apply(&self, config: &mut RunnerConfig) {
        if let Some(kubeconfig) = &self.kubeconfig {
            config.kubeconfig = Some(kubeconfig.clone());
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(workload) = &self.workload {
            config.workload = Some(workload.clone());
        }
        if let Some(interval) = self.poll_interval_secs {
            config.poll_interval_secs = interval;
        }
        if let Some(max_wait) = self.max_wait_secs {
            config.max_wait_secs = max_wait;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        config.keep_resources |= self.keep_resources;
        config.cleanup_on_cancel |= self.cleanup_on_cancel;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = RunnerConfig::init()?;
    cli.apply(&mut config);
    config.validate()?;
    init_structured_logging(config.log_format)?;

    let definition = match &config.workload {
        Some(path) => WorkloadManifest::load(path)?.into_definition()?,
        None => demo_workload(&cli.message)?,
    };

    let orchestrator = KubeOrchestrator::connect(config.kubeconfig.as_deref())
        .await
        .context("Failed to create Kubernetes client")?;
    if !orchestrator.check_cluster_connectivity().await {
        warn!("⚠️ Cluster did not answer the version check, trying anyway");
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received, stopping");
            signal_token.cancel();
        }
    });

    let pipeline = BatchPipeline::new(Arc::new(orchestrator), config.pipeline_options());
    match pipeline.run(&definition, cancel).await {
        Ok(report) => {
            print_report(&report, config.log_format);
            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(e) => {
            if let Some(job_name) = e.job_name() {
                error!(
                    "❌ Job {} in namespace {} needs manual attention",
                    job_name, config.namespace
                );
            }
            Err(e.into())
        }
    }
}

fn print_report(report: &RunReport, format: LogFormat) {
    if let Some(logs) = &report.logs {
        for (unit, containers) in &logs.logs {
            for log in containers {
                println!(
                    "Logs for {} ({}):\n=====\n{}\n=====",
                    unit,
                    log.container,
                    log.text()
                );
            }
        }
        for (unit, reason) in &logs.errors {
            println!("Logs for {} unavailable: {}", unit, reason);
        }
    }
    if let Some(log_error) = &report.log_error {
        println!("No logs collected: {}", log_error);
    }

    let cleanup = match &report.cleanup {
        CleanupOutcome::Completed(cleanup) => format!(
            "deleted job ({:?}) and {} pod(s)",
            cleanup.job,
            cleanup.deleted_units.len()
        ),
        CleanupOutcome::Failed(reason) => format!("failed: {}", reason),
        CleanupOutcome::Skipped(reason) => format!("skipped: {}", reason),
    };

    if format == LogFormat::Json {
        let summary = json!({
            "job_name": report.job_name,
            "namespace": report.namespace,
            "state": report.terminal.state,
            "samples": report.terminal.samples,
            "elapsed_secs": report.terminal.elapsed.as_secs_f64(),
            "cleanup": cleanup,
            "finished_at": chrono::Utc::now().to_rfc3339(),
        });
        println!("{}", summary);
    } else {
        info!(
            "🏁 Job {} in namespace {} finished {} after {} sample(s); cleanup {}",
            report.job_name,
            report.namespace,
            report.terminal.state,
            report.terminal.samples,
            cleanup
        );
    }
}
