//! End-to-end run of one workload: submit, wait, collect logs, clean up.

use super::cleanup::{CleanupCoordinator, CleanupReport};
use super::log_collector::{CollectedLogs, LogCollector};
use super::orchestrator::Orchestrator;
use super::poller::{PollSettings, StatusPoller, TerminalStatus};
use super::submitter::{JobHandle, JobSubmitter};
use super::workload::WorkloadDefinition;
use crate::error::{PollErrorKind, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub namespace: String,
    pub poll: PollSettings,
    /// Leave the Job and its pods in place after success
    pub keep_resources: bool,
    /// Best-effort cleanup when polling is cancelled
    pub cleanup_on_cancel: bool,
}

impl PipelineOptions {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            poll: PollSettings::default(),
            keep_resources: false,
            cleanup_on_cancel: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CleanupOutcome {
    Completed(CleanupReport),
    Failed(String),
    Skipped(String),
}

/// Everything known about a run that got as far as a terminal Job state.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub job_name: String,
    pub namespace: String,
    pub terminal: TerminalStatus,
    pub logs: Option<CollectedLogs>,
    pub log_error: Option<String>,
    pub cleanup: CleanupOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.terminal.is_success() && !matches!(self.cleanup, CleanupOutcome::Failed(_))
    }
}

pub struct BatchPipeline {
    orchestrator: Arc<dyn Orchestrator>,
    options: PipelineOptions,
}

impl BatchPipeline {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, options: PipelineOptions) -> Self {
        Self {
            orchestrator,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run `definition` to completion.
    ///
    /// Submission and polling failures are returned as errors and never
    /// trigger cleanup, except for a cancellation with `cleanup_on_cancel`
    /// set. A failed Job is reported with its logs and left in place.
    pub async fn run(
        &self,
        definition: &WorkloadDefinition,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let orchestrator = self.orchestrator.as_ref();
        let namespace = self.options.namespace.as_str();

        let mut handle = JobSubmitter::new(orchestrator)
            .submit(definition, namespace)
            .await?;

        let poller = StatusPoller::new(orchestrator, self.options.poll.clone())
            .with_cancellation(cancel);
        let terminal = match poller.await_terminal(&mut handle).await {
            Ok(terminal) => terminal,
            Err(e) => {
                if e.poll_kind() == Some(PollErrorKind::Cancelled) && self.options.cleanup_on_cancel
                {
                    self.cleanup_after_cancel(&handle).await;
                } else {
                    warn!(
                        "⚠️ Leaving job {} in namespace {} for inspection",
                        handle.name(),
                        namespace
                    );
                }
                return Err(e);
            }
        };

        let (logs, log_error) = match LogCollector::new(orchestrator).collect_logs(&handle).await {
            Ok(logs) => (Some(logs), None),
            Err(e) => {
                warn!("⚠️ {}", e);
                (None, Some(e.to_string()))
            }
        };

        let cleanup = self.cleanup(&handle, &terminal).await;

        Ok(RunReport {
            job_name: handle.name().to_string(),
            namespace: namespace.to_string(),
            terminal,
            logs,
            log_error,
            cleanup,
        })
    }

    async fn cleanup(&self, handle: &JobHandle, terminal: &TerminalStatus) -> CleanupOutcome {
        if !terminal.is_success() {
            warn!(
                "⚠️ Job {} ended {}, leaving it in place for inspection",
                handle.name(),
                terminal.state
            );
            return CleanupOutcome::Skipped(format!("job ended {}", terminal.state));
        }
        if self.options.keep_resources {
            info!("📌 Keeping job {} and its pods", handle.name());
            return CleanupOutcome::Skipped("resources kept on request".to_string());
        }

        match CleanupCoordinator::new(self.orchestrator.as_ref())
            .cleanup(handle)
            .await
        {
            Ok(report) => CleanupOutcome::Completed(report),
            Err(e) => {
                error!("❌ {}", e);
                CleanupOutcome::Failed(e.to_string())
            }
        }
    }

    async fn cleanup_after_cancel(&self, handle: &JobHandle) {
        warn!("🚨 Cleaning up cancelled job: {}", handle.name());
        if let Err(e) = CleanupCoordinator::new(self.orchestrator.as_ref())
            .including_unfinished()
            .cleanup(handle)
            .await
        {
            error!("❌ Cleanup after cancellation failed: {}", e);
        }
    }
}
