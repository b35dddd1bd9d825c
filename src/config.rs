use crate::error::{AppError, Result};
use crate::kubernetes::{PipelineOptions, PollSettings};
use crate::logging::LogFormat;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "poc-kubernetes-batch";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunnerConfig {
    pub kubeconfig: Option<PathBuf>,
    pub namespace: String,
    pub workload: Option<PathBuf>,
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
    pub query_retries: u32,
    pub retry_backoff_ms: u64,
    pub keep_resources: bool,
    pub cleanup_on_cancel: bool,
    pub log_format: LogFormat,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            kubeconfig: default_kubeconfig(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            workload: None,
            poll_interval_secs: 1,
            max_wait_secs: 300,
            query_retries: 3,
            retry_backoff_ms: 500,
            keep_resources: false,
            cleanup_on_cancel: false,
            log_format: LogFormat::Compact,
        }
    }
}

impl RunnerConfig {
    /// Read the configuration from the process environment.
    pub fn init() -> Result<RunnerConfig> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<RunnerConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RunnerConfig::default();

        let kubeconfig = lookup("KUBECONFIG")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or(defaults.kubeconfig);
        let namespace = lookup("BATCH_NAMESPACE").unwrap_or(defaults.namespace);
        let workload = lookup("BATCH_WORKLOAD").map(PathBuf::from);

        let config = RunnerConfig {
            kubeconfig,
            namespace,
            workload,
            poll_interval_secs: parse_var(
                &lookup,
                "BATCH_POLL_INTERVAL_SECS",
                defaults.poll_interval_secs,
            )?,
            max_wait_secs: parse_var(&lookup, "BATCH_MAX_WAIT_SECS", defaults.max_wait_secs)?,
            query_retries: parse_var(&lookup, "BATCH_QUERY_RETRIES", defaults.query_retries)?,
            retry_backoff_ms: parse_var(
                &lookup,
                "BATCH_RETRY_BACKOFF_MS",
                defaults.retry_backoff_ms,
            )?,
            keep_resources: parse_var(&lookup, "BATCH_KEEP_RESOURCES", defaults.keep_resources)?,
            cleanup_on_cancel: parse_var(
                &lookup,
                "BATCH_CLEANUP_ON_CANCEL",
                defaults.cleanup_on_cancel,
            )?,
            log_format: parse_var(&lookup, "LOG_FORMAT", defaults.log_format)?,
        };

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(AppError::ConfigError("namespace cannot be empty".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(AppError::ConfigError(
                "poll interval must be at least one second".to_string(),
            ));
        }
        if self.max_wait_secs == 0 {
            return Err(AppError::ConfigError(
                "max wait must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.max_wait_secs),
        )
        .with_retries(
            self.query_retries,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            namespace: self.namespace.clone(),
            poll: self.poll_settings(),
            keep_resources: self.keep_resources,
            cleanup_on_cancel: self.cleanup_on_cancel,
        }
    }
}

fn default_kubeconfig() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(".kube").join("config"))
        .filter(|path| path.exists())
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::ConfigError(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
