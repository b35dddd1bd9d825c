//! YAML workload manifests and the built-in demo workload.

use super::workload::{
    RestartPolicy, Stage, WorkloadDefinition, WorkloadDefinitionBuilder, DEFAULT_APP_LABEL,
    DEFAULT_BACKOFF_LIMIT, DEFAULT_COMPONENT_LABEL, DEFAULT_JOB_NAME_PREFIX, DEFAULT_VOLUME_NAME,
};
use crate::error::Result;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

pub const DEMO_MOUNT_PATH: &str = "/tmp/results";
pub const DEMO_RESULTS_FILE: &str = "fromInitContainer";
pub const DEMO_INIT_MESSAGE: &str = "Hello Init Container World!";

/// On-disk form of a workload.
///
/// ```yaml
/// sharedVolume:
///   mountPath: /tmp/results
/// initStages:
///   - name: writer
///     image: alpine:latest
///     args: ["sh", "-c", "echo hi > /tmp/results/out"]
/// mainStages:
///   - name: reader
///     image: alpine:latest
///     args: ["sh", "-c", "cat /tmp/results/out"]
///     env:
///       - name: FOO
///         value: FOOVAL
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkloadManifest {
    pub shared_volume: SharedVolumeManifest,
    pub init_stages: Vec<StageManifest>,
    pub main_stages: Vec<StageManifest>,
    #[serde(default = "one")]
    pub parallelism: i32,
    #[serde(default = "one")]
    pub completions: i32,
    #[serde(default = "default_backoff_limit")]
    pub backoff_limit: i32,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub active_deadline_seconds: Option<i64>,
    #[serde(default = "default_prefix")]
    pub job_name_prefix: String,
    #[serde(default)]
    pub labels: LabelsManifest,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SharedVolumeManifest {
    #[serde(default = "default_volume_name")]
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StageManifest {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<EnvManifest>,
    #[serde(default)]
    pub image_pull_policy: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvManifest {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelsManifest {
    pub app: String,
    pub component: String,
}

impl Default for LabelsManifest {
    fn default() -> Self {
        Self {
            app: DEFAULT_APP_LABEL.to_string(),
            component: DEFAULT_COMPONENT_LABEL.to_string(),
        }
    }
}

fn one() -> i32 {
    1
}

fn default_backoff_limit() -> i32 {
    DEFAULT_BACKOFF_LIMIT
}

fn default_prefix() -> String {
    DEFAULT_JOB_NAME_PREFIX.to_string()
}

fn default_volume_name() -> String {
    DEFAULT_VOLUME_NAME.to_string()
}

impl StageManifest {
    fn into_stage(self, init: bool) -> Stage {
        let mut stage = if init {
            Stage::init(self.name, self.image)
        } else {
            Stage::main(self.name, self.image)
        };
        stage = stage.args(self.args);
        for var in self.env {
            stage = stage.env(var.name, var.value);
        }
        if let Some(policy) = self.image_pull_policy {
            stage = stage.image_pull_policy(policy);
        }
        stage
    }
}

impl WorkloadManifest {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        info!("📄 Loading workload manifest: {}", path.display());
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn into_definition(self) -> Result<WorkloadDefinition> {
        let stages = self
            .init_stages
            .into_iter()
            .map(|stage| stage.into_stage(true))
            .chain(
                self.main_stages
                    .into_iter()
                    .map(|stage| stage.into_stage(false)),
            );

        WorkloadDefinitionBuilder::new(self.shared_volume.mount_path)
            .volume_name(self.shared_volume.name)
            .stages(stages)
            .parallelism(self.parallelism)
            .completions(self.completions)
            .backoff_limit(self.backoff_limit)
            .restart_policy(self.restart_policy)
            .active_deadline_seconds(self.active_deadline_seconds)
            .job_name_prefix(self.job_name_prefix)
            .labels(self.labels.app, self.labels.component)
            .build()
    }
}

/// Two-stage demo: the init stage writes `message` into the shared volume and
/// the main stage prints it back.
pub fn demo_workload(message: &str) -> Result<WorkloadDefinition> {
    let results_file = format!("{}/{}", DEMO_MOUNT_PATH, DEMO_RESULTS_FILE);

    let init = Stage::init("poc-init-container", "alpine:latest").args([
        "sh".to_string(),
        "-c".to_string(),
        format!(
            "echo {} > {} && cat {}",
            shell_quote(message),
            results_file,
            results_file
        ),
    ]);
    let main = Stage::main("poc-main-container", "alpine:latest")
        .env("FOO", "FOOVAL")
        .env("BAR", "BARVAL")
        .args([
            "sh".to_string(),
            "-c".to_string(),
            format!("echo Hello Main Container World! && cat {}", results_file),
        ]);

    WorkloadDefinition::build(vec![init, main], DEMO_MOUNT_PATH)
}

/// Single-quote `value` for `sh -c`.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
