//! Workload definitions
//!
//! A workload is one Kubernetes Job whose pod runs an ordered list of init
//! containers followed by a set of main containers. Every container mounts the
//! same `emptyDir` volume so stages can hand data to each other.

use crate::error::{AppError, Result};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_APP_LABEL: &str = "jobWorker";
pub const DEFAULT_COMPONENT_LABEL: &str = "jobs";
pub const RUN_ID_LABEL: &str = "batch-run-id";
pub const DEFAULT_VOLUME_NAME: &str = "results";
pub const DEFAULT_JOB_NAME_PREFIX: &str = "poc-job-";
pub const DEFAULT_BACKOFF_LIMIT: i32 = 6;

/// Whether a stage runs as an init container or as a main container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageRole {
    Init,
    Main,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RestartPolicy {
    #[default]
    OnFailure,
    Never,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::OnFailure => "OnFailure",
            RestartPolicy::Never => "Never",
        }
    }
}

/// Single environment variable, kept as an ordered pair so duplicates can be detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarSpec {
    pub name: String,
    pub value: String,
}

/// One container of the workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub image: String,
    pub role: StageRole,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<EnvVarSpec>,
    #[serde(default = "default_pull_policy")]
    pub image_pull_policy: String,
}

fn default_pull_policy() -> String {
    "IfNotPresent".to_string()
}

impl Stage {
    pub fn init(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self::new(name, image, StageRole::Init)
    }

    pub fn main(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self::new(name, image, StageRole::Main)
    }

    fn new(name: impl Into<String>, image: impl Into<String>, role: StageRole) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            role,
            args: Vec::new(),
            env: Vec::new(),
            image_pull_policy: default_pull_policy(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(EnvVarSpec {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn image_pull_policy(mut self, policy: impl Into<String>) -> Self {
        self.image_pull_policy = policy.into();
        self
    }

    fn to_container(&self, volume: &SharedVolume) -> Container {
        let env: Vec<EnvVar> = self
            .env
            .iter()
            .map(|var| EnvVar {
                name: var.name.clone(),
                value: Some(var.value.clone()),
                ..Default::default()
            })
            .collect();

        Container {
            name: self.name.clone(),
            image: Some(self.image.clone()),
            image_pull_policy: Some(self.image_pull_policy.clone()),
            args: if self.args.is_empty() {
                None
            } else {
                Some(self.args.clone())
            },
            env: if env.is_empty() { None } else { Some(env) },
            volume_mounts: Some(vec![VolumeMount {
                name: volume.name.clone(),
                mount_path: volume.mount_path.clone(),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }
}

/// Ephemeral volume mounted at the same path by every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedVolume {
    pub name: String,
    pub mount_path: String,
}

/// Identifying label set of a workload.
///
/// Built once by [`WorkloadDefinitionBuilder`] and reused verbatim to select
/// the workload's pods for log collection and cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    labels: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// True when every selector label is present with the same value.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        !self.labels.is_empty()
            && self
                .labels
                .iter()
                .all(|(key, value)| labels.get(key) == Some(value))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .labels
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        write!(f, "{}", rendered.join(","))
    }
}

/// Immutable description of the Job to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadDefinition {
    init_stages: Vec<Stage>,
    main_stages: Vec<Stage>,
    shared_volume: SharedVolume,
    parallelism: i32,
    completions: i32,
    backoff_limit: i32,
    restart_policy: RestartPolicy,
    active_deadline_seconds: Option<i64>,
    job_name_prefix: String,
    selector: LabelSelector,
}

impl WorkloadDefinition {
    /// Validate `stages` and wrap them with the default policies.
    pub fn build(stages: Vec<Stage>, shared_volume_mount_path: &str) -> Result<Self> {
        WorkloadDefinitionBuilder::new(shared_volume_mount_path)
            .stages(stages)
            .build()
    }

    pub fn init_stages(&self) -> &[Stage] {
        &self.init_stages
    }

    pub fn main_stages(&self) -> &[Stage] {
        &self.main_stages
    }

    pub fn shared_volume(&self) -> &SharedVolume {
        &self.shared_volume
    }

    pub fn parallelism(&self) -> i32 {
        self.parallelism
    }

    pub fn completions(&self) -> i32 {
        self.completions
    }

    pub fn backoff_limit(&self) -> i32 {
        self.backoff_limit
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        self.restart_policy
    }

    pub fn job_name_prefix(&self) -> &str {
        &self.job_name_prefix
    }

    pub fn selector(&self) -> &LabelSelector {
        &self.selector
    }

    /// Render the definition as a `batch/v1` Job for the given namespace.
    ///
    /// The name is left to the API server through `generateName`.
    pub fn to_job(&self, namespace: &str) -> Job {
        let labels = self.selector.labels().clone();

        let pod_spec = PodSpec {
            init_containers: Some(
                self.init_stages
                    .iter()
                    .map(|stage| stage.to_container(&self.shared_volume))
                    .collect(),
            ),
            containers: self
                .main_stages
                .iter()
                .map(|stage| stage.to_container(&self.shared_volume))
                .collect(),
            restart_policy: Some(self.restart_policy.as_str().to_string()),
            volumes: Some(vec![Volume {
                name: self.shared_volume.name.clone(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            }]),
            ..Default::default()
        };

        Job {
            metadata: ObjectMeta {
                generate_name: Some(self.job_name_prefix.clone()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                parallelism: Some(self.parallelism),
                completions: Some(self.completions),
                backoff_limit: Some(self.backoff_limit),
                active_deadline_seconds: self.active_deadline_seconds,
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        namespace: Some(namespace.to_string()),
                        ..Default::default()
                    }),
                    spec: Some(pod_spec),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Collects caller intent and validates it into a [`WorkloadDefinition`].
#[derive(Debug, Clone)]
pub struct WorkloadDefinitionBuilder {
    stages: Vec<Stage>,
    volume_name: String,
    mount_path: String,
    parallelism: i32,
    completions: i32,
    backoff_limit: i32,
    restart_policy: RestartPolicy,
    active_deadline_seconds: Option<i64>,
    job_name_prefix: String,
    app_label: String,
    component_label: String,
    run_id: Option<String>,
}

impl WorkloadDefinitionBuilder {
    pub fn new(shared_volume_mount_path: impl Into<String>) -> Self {
        Self {
            stages: Vec::new(),
            volume_name: DEFAULT_VOLUME_NAME.to_string(),
            mount_path: shared_volume_mount_path.into(),
            parallelism: 1,
            completions: 1,
            backoff_limit: DEFAULT_BACKOFF_LIMIT,
            restart_policy: RestartPolicy::OnFailure,
            active_deadline_seconds: None,
            job_name_prefix: DEFAULT_JOB_NAME_PREFIX.to_string(),
            app_label: DEFAULT_APP_LABEL.to_string(),
            component_label: DEFAULT_COMPONENT_LABEL.to_string(),
            run_id: None,
        }
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.stages.extend(stages);
        self
    }

    pub fn volume_name(mut self, name: impl Into<String>) -> Self {
        self.volume_name = name.into();
        self
    }

    pub fn parallelism(mut self, parallelism: i32) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn completions(mut self, completions: i32) -> Self {
        self.completions = completions;
        self
    }

    pub fn backoff_limit(mut self, backoff_limit: i32) -> Self {
        self.backoff_limit = backoff_limit;
        self
    }

    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    pub fn active_deadline_seconds(mut self, seconds: Option<i64>) -> Self {
        self.active_deadline_seconds = seconds;
        self
    }

    pub fn job_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.job_name_prefix = prefix.into();
        self
    }

    pub fn labels(mut self, app: impl Into<String>, component: impl Into<String>) -> Self {
        self.app_label = app.into();
        self.component_label = component.into();
        self
    }

    /// Pin the per-run label instead of generating a fresh UUID.
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn build(self) -> Result<WorkloadDefinition> {
        let (init_stages, main_stages): (Vec<Stage>, Vec<Stage>) = self
            .stages
            .into_iter()
            .partition(|stage| stage.role == StageRole::Init);

        if init_stages.is_empty() {
            return Err(AppError::ValidationError(
                "Workload requires at least one init stage".to_string(),
            ));
        }
        if main_stages.is_empty() {
            return Err(AppError::ValidationError(
                "Workload requires at least one main stage".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for stage in init_stages.iter().chain(main_stages.iter()) {
            validate_stage(stage)?;
            if !names.insert(stage.name.as_str()) {
                return Err(AppError::ValidationError(format!(
                    "Duplicate stage name: {}",
                    stage.name
                )));
            }
        }

        if !self.mount_path.starts_with('/') {
            return Err(AppError::ValidationError(format!(
                "Shared volume mount path must be absolute: '{}'",
                self.mount_path
            )));
        }
        if !is_dns_label(&self.volume_name) {
            return Err(AppError::ValidationError(format!(
                "Invalid shared volume name: '{}'",
                self.volume_name
            )));
        }
        if self.parallelism < 1 || self.completions < 1 {
            return Err(AppError::ValidationError(format!(
                "parallelism and completions must be at least 1 (got {} and {})",
                self.parallelism, self.completions
            )));
        }
        if self.backoff_limit < 0 {
            return Err(AppError::ValidationError(format!(
                "backoffLimit cannot be negative: {}",
                self.backoff_limit
            )));
        }
        if !is_job_name_prefix(&self.job_name_prefix) {
            return Err(AppError::ValidationError(format!(
                "Job name prefix must be 1-58 lowercase alphanumerics or '-', starting with an alphanumeric: '{}'",
                self.job_name_prefix
            )));
        }

        let run_id = self.run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), self.app_label);
        labels.insert("component".to_string(), self.component_label);
        labels.insert(RUN_ID_LABEL.to_string(), run_id);
        for value in labels.values() {
            if !is_label_value(value) {
                return Err(AppError::ValidationError(format!(
                    "Invalid label value: '{}'",
                    value
                )));
            }
        }

        debug!(
            "🏗️ Built workload: {} init stage(s), {} main stage(s), volume {} at {}",
            init_stages.len(),
            main_stages.len(),
            self.volume_name,
            self.mount_path
        );

        Ok(WorkloadDefinition {
            init_stages,
            main_stages,
            shared_volume: SharedVolume {
                name: self.volume_name,
                mount_path: self.mount_path,
            },
            parallelism: self.parallelism,
            completions: self.completions,
            backoff_limit: self.backoff_limit,
            restart_policy: self.restart_policy,
            active_deadline_seconds: self.active_deadline_seconds,
            job_name_prefix: self.job_name_prefix,
            selector: LabelSelector::new(labels),
        })
    }
}

fn validate_stage(stage: &Stage) -> Result<()> {
    if !is_dns_label(&stage.name) {
        return Err(AppError::ValidationError(format!(
            "Invalid stage name: '{}'",
            stage.name
        )));
    }
    if stage.image.trim().is_empty() {
        return Err(AppError::ValidationError(format!(
            "Stage '{}' requires an image",
            stage.name
        )));
    }

    let mut env_names = HashSet::new();
    for var in &stage.env {
        if var.name.is_empty() {
            return Err(AppError::ValidationError(format!(
                "Stage '{}' has an environment variable without a name",
                stage.name
            )));
        }
        if !env_names.insert(var.name.as_str()) {
            return Err(AppError::ValidationError(format!(
                "Stage '{}' defines environment variable '{}' more than once",
                stage.name, var.name
            )));
        }
    }

    Ok(())
}

/// RFC 1123 label: lowercase alphanumerics and '-', at most 63 characters.
fn is_dns_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes[0] != b'-'
        && bytes[bytes.len() - 1] != b'-'
}

/// `generateName` prefix: the cluster appends five characters, so a trailing
/// '-' is fine but the result must still be a DNS label.
fn is_job_name_prefix(value: &str) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 58
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes[0] != b'-'
}

fn is_label_value(value: &str) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
}
