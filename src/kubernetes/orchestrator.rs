//! Capability surface consumed from the cluster
//!
//! The lifecycle stages only talk to the cluster through [`Orchestrator`], so
//! they can run against a real API server or an in-memory double.

use super::workload::{LabelSelector, WorkloadDefinition};
use crate::error::OrchestratorError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

/// Counters and conditions of a Job as last reported by the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
    /// `Complete=True` condition present
    pub complete: bool,
    /// `Failed=True` condition present
    pub failed_condition: bool,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl UnitPhase {
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => UnitPhase::Pending,
            Some("Running") => UnitPhase::Running,
            Some("Succeeded") => UnitPhase::Succeeded,
            Some("Failed") => UnitPhase::Failed,
            _ => UnitPhase::Unknown,
        }
    }
}

/// A pod created for the Job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionUnit {
    pub name: String,
    pub phase: UnitPhase,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Create the Job and return the name assigned by the cluster.
    async fn create_job(
        &self,
        namespace: &str,
        definition: &WorkloadDefinition,
    ) -> OrchestratorResult<String>;

    async fn get_job_status(&self, namespace: &str, name: &str) -> OrchestratorResult<JobStatus>;

    async fn list_execution_units(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> OrchestratorResult<Vec<ExecutionUnit>>;

    /// Log of one container of a pod.
    async fn get_logs(
        &self,
        namespace: &str,
        unit_name: &str,
        container: &str,
    ) -> OrchestratorResult<Vec<u8>>;

    async fn delete_job(&self, namespace: &str, name: &str) -> OrchestratorResult<DeleteOutcome>;

    async fn delete_execution_unit(
        &self,
        namespace: &str,
        name: &str,
    ) -> OrchestratorResult<DeleteOutcome>;
}
