#![allow(dead_code)]

pub mod mocks;

use kube_job_runner::kubernetes::{
    JobHandle, JobStatus, JobSubmitter, Stage, WorkloadDefinition, WorkloadDefinitionBuilder,
};
use std::collections::BTreeMap;

pub use mocks::MockOrchestrator;

pub const NAMESPACE: &str = "poc-kubernetes-batch";

pub fn test_definition() -> WorkloadDefinition {
    definition_with_completions(1)
}

pub fn definition_with_completions(completions: i32) -> WorkloadDefinition {
    WorkloadDefinitionBuilder::new("/tmp/results")
        .stage(
            Stage::init("writer", "alpine:latest")
                .args(["sh", "-c", "echo X > /tmp/results/value"]),
        )
        .stage(Stage::main("reader", "alpine:latest").args(["sh", "-c", "cat /tmp/results/value"]))
        .completions(completions)
        .build()
        .expect("test workload is valid")
}

pub fn status(active: i32, succeeded: i32, failed: i32) -> JobStatus {
    JobStatus {
        active,
        succeeded,
        failed,
        ..Default::default()
    }
}

/// Labels a pod of `definition`'s Job named `job_name` carries.
pub fn job_labels(definition: &WorkloadDefinition, job_name: &str) -> BTreeMap<String, String> {
    let mut labels = definition.selector().labels().clone();
    labels.insert("job-name".to_string(), job_name.to_string());
    labels
}

pub async fn submit(mock: &MockOrchestrator, definition: &WorkloadDefinition) -> JobHandle {
    JobSubmitter::new(mock)
        .submit(definition, NAMESPACE)
        .await
        .expect("submission succeeds")
}
