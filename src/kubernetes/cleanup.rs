//! Resource cleanup
//!
//! Deletes the Job, then every pod that both matches the Job's selector and
//! has phase `Succeeded`. A resource that is already gone counts as cleaned
//! up, so running cleanup twice is harmless.
//!
//! Tearing down an interrupted run uses [`CleanupCoordinator::including_unfinished`],
//! which also deletes matching pods that are still pending or running.

use super::orchestrator::{DeleteOutcome, Orchestrator, UnitPhase};
use super::submitter::JobHandle;
use crate::error::{AppError, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub job_name: String,
    pub job: DeleteOutcome,
    pub deleted_units: Vec<String>,
    /// Pods that disappeared before we got to them
    pub already_gone_units: Vec<String>,
    /// Matching pods left in place because they did not succeed
    pub skipped_units: Vec<String>,
}

pub struct CleanupCoordinator<'a> {
    orchestrator: &'a dyn Orchestrator,
    include_unfinished: bool,
}

impl<'a> CleanupCoordinator<'a> {
    pub fn new(orchestrator: &'a dyn Orchestrator) -> Self {
        Self {
            orchestrator,
            include_unfinished: false,
        }
    }

    /// Delete matching pods whatever their phase.
    pub fn including_unfinished(mut self) -> Self {
        self.include_unfinished = true;
        self
    }

    pub async fn cleanup(&self, handle: &JobHandle) -> Result<CleanupReport> {
        let namespace = handle.namespace();
        let job_name = handle.name();
        info!("🧹 Deleting Job: {}", job_name);

        let job = self
            .orchestrator
            .delete_job(namespace, job_name)
            .await
            .map_err(|e| AppError::CleanupError {
                job_name: job_name.to_string(),
                failures: vec![format!("job {}: {}", job_name, e)],
            })?;
        if job == DeleteOutcome::NotFound {
            debug!("Job {} was already deleted", job_name);
        }

        let units = self
            .orchestrator
            .list_execution_units(namespace, handle.selector())
            .await
            .map_err(|e| AppError::CleanupError {
                job_name: job_name.to_string(),
                failures: vec![format!("listing pods: {}", e)],
            })?;

        let mut report = CleanupReport {
            job_name: job_name.to_string(),
            job,
            deleted_units: Vec::new(),
            already_gone_units: Vec::new(),
            skipped_units: Vec::new(),
        };
        let mut failures = Vec::new();

        info!("🧹 Deleting completed pods..");
        for unit in units {
            if !handle.selector().matches(&unit.labels) {
                warn!(
                    "⚠️ Pod {} returned for selector {} but its labels do not match, leaving it",
                    unit.name,
                    handle.selector()
                );
                continue;
            }
            if !self.include_unfinished && unit.phase != UnitPhase::Succeeded {
                debug!("Keeping pod {} in phase {:?}", unit.name, unit.phase);
                report.skipped_units.push(unit.name);
                continue;
            }

            match self
                .orchestrator
                .delete_execution_unit(namespace, &unit.name)
                .await
            {
                Ok(DeleteOutcome::Deleted) => {
                    info!("🗑️ Deleting Job Pod: {}, Status: {:?}", unit.name, unit.phase);
                    report.deleted_units.push(unit.name);
                }
                Ok(DeleteOutcome::NotFound) => report.already_gone_units.push(unit.name),
                Err(e) => {
                    warn!("⚠️ Failed to delete pod {}: {}", unit.name, e);
                    failures.push(format!("pod {}: {}", unit.name, e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(AppError::CleanupError {
                job_name: job_name.to_string(),
                failures,
            });
        }

        info!(
            "✅ Cleanup of job {} complete ({} pod(s) deleted, {} kept)",
            job_name,
            report.deleted_units.len(),
            report.skipped_units.len()
        );
        Ok(report)
    }
}
