//! Kubernetes batch job lifecycle
//!
//! This module runs a single multi-stage workload as a Kubernetes Job:
//! - Workload definition and validation
//! - Job submission
//! - Status polling until a terminal state
//! - Log collection from the Job's pods
//! - Cleanup of the Job and its completed pods

pub mod cleanup;
pub mod kube_client;
pub mod log_collector;
pub mod manifest;
pub mod orchestrator;
pub mod pipeline;
pub mod poller;
pub mod submitter;
pub mod workload;

pub use cleanup::{CleanupCoordinator, CleanupReport};
pub use kube_client::KubeOrchestrator;
pub use log_collector::{CollectedLogs, ContainerLog, LogCollector};
pub use manifest::{demo_workload, WorkloadManifest};
pub use orchestrator::{DeleteOutcome, ExecutionUnit, JobStatus, Orchestrator, UnitPhase};
pub use pipeline::{BatchPipeline, CleanupOutcome, PipelineOptions, RunReport};
pub use poller::{JobState, PollSettings, StatusPoller, TerminalStatus};
pub use submitter::{JobHandle, JobSubmitter};
pub use workload::{
    LabelSelector, RestartPolicy, SharedVolume, Stage, StageRole, WorkloadDefinition,
    WorkloadDefinitionBuilder,
};
