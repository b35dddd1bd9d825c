//! Job submission

use super::orchestrator::{JobStatus, Orchestrator};
use super::workload::{LabelSelector, StageRole, WorkloadDefinition};
use crate::error::{AppError, OrchestratorError, Result};
use serde::Serialize;
use tracing::{debug, error, info};

/// Reference to a Job created in the cluster.
///
/// `status` only ever changes through [`JobHandle::refresh`], which re-reads it
/// from the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    name: String,
    namespace: String,
    selector: LabelSelector,
    completions: i32,
    backoff_limit: i32,
    /// Stage containers of every pod, init stages first
    containers: Vec<(String, StageRole)>,
    status: JobStatus,
}

impl JobHandle {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        definition: &WorkloadDefinition,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            selector: definition.selector().clone(),
            completions: definition.completions(),
            backoff_limit: definition.backoff_limit(),
            containers: definition
                .init_stages()
                .iter()
                .chain(definition.main_stages())
                .map(|stage| (stage.name.clone(), stage.role))
                .collect(),
            status: JobStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn selector(&self) -> &LabelSelector {
        &self.selector
    }

    pub fn completions(&self) -> i32 {
        self.completions
    }

    /// Failed pods tolerated before the Job counts as failed.
    pub fn backoff_limit(&self) -> i32 {
        self.backoff_limit
    }

    pub fn containers(&self) -> &[(String, StageRole)] {
        &self.containers
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    /// Re-query the Job status and store it on the handle.
    pub async fn refresh(
        &mut self,
        orchestrator: &dyn Orchestrator,
    ) -> std::result::Result<&JobStatus, OrchestratorError> {
        self.status = orchestrator
            .get_job_status(&self.namespace, &self.name)
            .await?;
        Ok(&self.status)
    }
}

pub struct JobSubmitter<'a> {
    orchestrator: &'a dyn Orchestrator,
}

impl<'a> JobSubmitter<'a> {
    pub fn new(orchestrator: &'a dyn Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Create exactly one Job for `definition`; no retries on failure.
    pub async fn submit(&self, definition: &WorkloadDefinition, namespace: &str) -> Result<JobHandle> {
        info!(
            "🚀 Submitting Kubernetes job to namespace: {} (selector {})",
            namespace,
            definition.selector()
        );

        let name = self
            .orchestrator
            .create_job(namespace, definition)
            .await
            .map_err(|e| {
                error!("❌ Job submission failed: {}", e);
                AppError::SubmissionError {
                    message: e.to_string(),
                }
            })?;

        if name.is_empty() {
            return Err(AppError::SubmissionError {
                message: "Orchestrator returned an empty job name".to_string(),
            });
        }

        debug!("📝 Job {} created from prefix {}", name, definition.job_name_prefix());
        info!("✅ Created Job: {}", name);

        Ok(JobHandle::new(name, namespace, definition))
    }
}
