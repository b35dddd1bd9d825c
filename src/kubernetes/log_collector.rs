//! Post-completion log retrieval
//!
//! Logs are fetched once per stage container of every pod after the Job is
//! terminal. A container whose log cannot be read is recorded with its error
//! and does not stop collection for the others; the call only fails when no
//! pod yields a log.

use super::orchestrator::Orchestrator;
use super::submitter::JobHandle;
use super::workload::StageRole;
use crate::error::{AppError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerLog {
    pub container: String,
    pub role: StageRole,
    pub bytes: Vec<u8>,
}

impl ContainerLog {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectedLogs {
    /// Container logs keyed by pod name, in stage order
    pub logs: BTreeMap<String, Vec<ContainerLog>>,
    /// Pods with at least one unreadable container, with the reasons
    pub errors: BTreeMap<String, String>,
}

impl CollectedLogs {
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Output of the pod's main stages, concatenated in stage order.
    pub fn log_text(&self, unit_name: &str) -> Option<String> {
        self.logs.get(unit_name).map(|containers| {
            containers
                .iter()
                .filter(|log| log.role == StageRole::Main)
                .map(ContainerLog::text)
                .collect()
        })
    }

    pub fn container_text(&self, unit_name: &str, container: &str) -> Option<String> {
        self.logs
            .get(unit_name)?
            .iter()
            .find(|log| log.container == container)
            .map(ContainerLog::text)
    }
}

pub struct LogCollector<'a> {
    orchestrator: &'a dyn Orchestrator,
}

impl<'a> LogCollector<'a> {
    pub fn new(orchestrator: &'a dyn Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn collect_logs(&self, handle: &JobHandle) -> Result<CollectedLogs> {
        debug!("📋 Collecting logs for job: {}", handle.name());

        let units = self
            .orchestrator
            .list_execution_units(handle.namespace(), handle.selector())
            .await
            .map_err(|e| AppError::LogRetrievalError {
                job_name: handle.name().to_string(),
                message: format!("failed to list pods: {}", e),
            })?;

        let mut collected = CollectedLogs::default();
        for unit in units
            .iter()
            .filter(|unit| handle.selector().matches(&unit.labels))
        {
            let mut container_logs = Vec::new();
            let mut failures = Vec::new();
            for (container, role) in handle.containers() {
                match self
                    .orchestrator
                    .get_logs(handle.namespace(), &unit.name, container)
                    .await
                {
                    Ok(bytes) => {
                        debug!(
                            "📋 Collected {} bytes from pod {} container {}",
                            bytes.len(),
                            unit.name,
                            container
                        );
                        container_logs.push(ContainerLog {
                            container: container.clone(),
                            role: *role,
                            bytes,
                        });
                    }
                    Err(e) => {
                        warn!(
                            "⚠️ Failed to collect logs from pod {} container {}: {}",
                            unit.name, container, e
                        );
                        failures.push(format!("{}: {}", container, e));
                    }
                }
            }

            if !failures.is_empty() {
                collected.errors.insert(unit.name.clone(), failures.join("; "));
            }
            if !container_logs.is_empty() {
                collected.logs.insert(unit.name.clone(), container_logs);
            }
        }

        if collected.logs.is_empty() {
            let message = if collected.errors.is_empty() {
                format!("no pods match selector {}", handle.selector())
            } else {
                let reasons: Vec<String> = collected
                    .errors
                    .iter()
                    .map(|(unit, reason)| format!("{}: {}", unit, reason))
                    .collect();
                format!("no pod yielded a log ({})", reasons.join("; "))
            };
            return Err(AppError::LogRetrievalError {
                job_name: handle.name().to_string(),
                message,
            });
        }

        info!(
            "✅ Collected logs from {} pod(s) of job {} ({} failed)",
            collected.logs.len(),
            handle.name(),
            collected.errors.len()
        );
        Ok(collected)
    }
}
