//! [`Orchestrator`] backed by the Kubernetes API through `kube`.

use super::orchestrator::{
    DeleteOutcome, ExecutionUnit, JobStatus, Orchestrator, OrchestratorResult, UnitPhase,
};
use super::workload::{LabelSelector, WorkloadDefinition};
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job as K8sJob;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{DeleteParams, ListParams, LogParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    Api, Client, Config,
};
use std::path::Path;
use tracing::{debug, info, warn};

pub struct KubeOrchestrator {
    client: Client,
}

impl KubeOrchestrator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from an explicit kubeconfig, or let `kube` infer one
    /// (`KUBECONFIG`, `~/.kube/config`, in-cluster service account).
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        let config = match kubeconfig {
            Some(path) => {
                debug!("🔑 Loading kubeconfig from {}", path.display());
                let kubeconfig = Kubeconfig::read_from(path)?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
            }
            None => Config::infer().await.map_err(|e| {
                crate::error::AppError::ConfigError(format!(
                    "Failed to infer Kubernetes configuration: {}",
                    e
                ))
            })?,
        };

        let client = Client::try_from(config)?;
        Ok(Self::new(client))
    }

    /// Check Kubernetes cluster connectivity
    pub async fn check_cluster_connectivity(&self) -> bool {
        match self.client.apiserver_version().await {
            Ok(version) => {
                info!(
                    "☸️ Connected to Kubernetes cluster, version: {}",
                    version.git_version
                );
                true
            }
            Err(e) => {
                warn!("Kubernetes cluster connectivity check failed: {}", e);
                false
            }
        }
    }

    fn jobs(&self, namespace: &str) -> Api<K8sJob> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl Orchestrator for KubeOrchestrator {
    async fn create_job(
        &self,
        namespace: &str,
        definition: &WorkloadDefinition,
    ) -> OrchestratorResult<String> {
        let job = definition.to_job(namespace);
        let created = self
            .jobs(namespace)
            .create(&PostParams::default(), &job)
            .await?;

        created.metadata.name.ok_or_else(|| {
            OrchestratorError::Rejected("Created job has no name in the response".to_string())
        })
    }

    async fn get_job_status(&self, namespace: &str, name: &str) -> OrchestratorResult<JobStatus> {
        let job = self.jobs(namespace).get(name).await?;
        Ok(job_status_from(&job))
    }

    async fn list_execution_units(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> OrchestratorResult<Vec<ExecutionUnit>> {
        let params = ListParams::default().labels(&selector.to_string());
        let pods = self.pods(namespace).list(&params).await?;

        Ok(pods.items.iter().filter_map(execution_unit_from).collect())
    }

    async fn get_logs(
        &self,
        namespace: &str,
        unit_name: &str,
        container: &str,
    ) -> OrchestratorResult<Vec<u8>> {
        let logs = self
            .pods(namespace)
            .logs(unit_name, &log_params(container))
            .await?;
        Ok(logs.into_bytes())
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> OrchestratorResult<DeleteOutcome> {
        let result = self
            .jobs(namespace)
            .delete(name, &job_delete_params())
            .await
            .map(|_| ());
        delete_outcome(result)
    }

    async fn delete_execution_unit(
        &self,
        namespace: &str,
        name: &str,
    ) -> OrchestratorResult<DeleteOutcome> {
        let result = self
            .pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ());
        delete_outcome(result)
    }
}

/// Pods with more than one container need the container named.
fn log_params(container: &str) -> LogParams {
    LogParams {
        container: Some(container.to_string()),
        ..LogParams::default()
    }
}

/// batch/v1 Jobs orphan their pods by default; let the garbage collector take them.
fn job_delete_params() -> DeleteParams {
    DeleteParams::background()
}

fn delete_outcome(result: std::result::Result<(), kube::Error>) -> OrchestratorResult<DeleteOutcome> {
    match result.map_err(OrchestratorError::from) {
        Ok(()) => Ok(DeleteOutcome::Deleted),
        Err(e) if e.is_not_found() => Ok(DeleteOutcome::NotFound),
        Err(e) => Err(e),
    }
}

fn job_status_from(job: &K8sJob) -> JobStatus {
    let Some(status) = &job.status else {
        return JobStatus::default();
    };

    let mut result = JobStatus {
        active: status.active.unwrap_or(0),
        succeeded: status.succeeded.unwrap_or(0),
        failed: status.failed.unwrap_or(0),
        ..Default::default()
    };

    for condition in status.conditions.iter().flatten() {
        if condition.status != "True" {
            continue;
        }
        match condition.type_.as_str() {
            "Complete" => result.complete = true,
            "Failed" => {
                result.failed_condition = true;
                result.failure_reason = condition
                    .message
                    .clone()
                    .or_else(|| condition.reason.clone());
            }
            _ => {}
        }
    }

    result
}

fn execution_unit_from(pod: &Pod) -> Option<ExecutionUnit> {
    let name = pod.metadata.name.clone()?;
    let phase = UnitPhase::parse(pod.status.as_ref().and_then(|s| s.phase.as_deref()));
    let labels = pod.metadata.labels.clone().unwrap_or_default();
    Some(ExecutionUnit {
        name,
        phase,
        labels,
    })
}
