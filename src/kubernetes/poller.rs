//! Status polling
//!
//! The poller samples the Job status on a fixed cadence until the Job is
//! terminal, the deadline passes, a query fails for good, or the caller
//! cancels. Each wait is a `tokio` sleep raced against the cancellation token,
//! so the terminal-detection rules do not depend on how the wait is realised.

use super::orchestrator::{JobStatus, Orchestrator};
use super::submitter::JobHandle;
use crate::error::{AppError, PollErrorKind, Result};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// Classify a status sample.
    ///
    /// `Succeeded` once `completions` pods succeeded, `Failed` once more pods
    /// failed than `backoff_limit` allows (or the cluster flagged the Job as
    /// failed), `Running` once anything happened, `Pending` before that.
    pub fn classify(status: &JobStatus, completions: i32, backoff_limit: i32) -> Self {
        if status.succeeded >= completions || status.complete {
            JobState::Succeeded
        } else if status.failed_condition || status.failed > backoff_limit {
            JobState::Failed
        } else if status.active > 0 || status.succeeded > 0 || status.failed > 0 {
            JobState::Running
        } else {
            JobState::Pending
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "Pending",
            JobState::Running => "Running",
            JobState::Succeeded => "Succeeded",
            JobState::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub max_wait: Duration,
    /// Retries for transient query failures before giving up
    pub max_query_retries: u32,
    /// First retry delay, doubled on every further attempt
    pub retry_backoff: Duration,
}

impl PollSettings {
    pub fn new(poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            poll_interval,
            max_wait,
            ..Default::default()
        }
    }

    pub fn with_retries(mut self, max_query_retries: u32, retry_backoff: Duration) -> Self {
        self.max_query_retries = max_query_retries;
        self.retry_backoff = retry_backoff;
        self
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(300),
            max_query_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Final observation of a Job that reached `Succeeded` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminalStatus {
    pub state: JobState,
    pub status: JobStatus,
    pub samples: u32,
    pub elapsed: Duration,
    /// Distinct states in the order they were observed
    pub observed_states: Vec<JobState>,
    /// Samples whose succeeded counter was below an earlier one
    pub succeeded_regressions: u32,
}

impl TerminalStatus {
    pub fn is_success(&self) -> bool {
        self.state == JobState::Succeeded
    }
}

pub struct StatusPoller<'a> {
    orchestrator: &'a dyn Orchestrator,
    settings: PollSettings,
    cancel: CancellationToken,
}

impl<'a> StatusPoller<'a> {
    pub fn new(orchestrator: &'a dyn Orchestrator, settings: PollSettings) -> Self {
        Self {
            orchestrator,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Sample `handle` until it is terminal.
    ///
    /// Read-only apart from refreshing the handle's cached status.
    pub async fn await_terminal(&self, handle: &mut JobHandle) -> Result<TerminalStatus> {
        info!(
            "⏳ Waiting for job completion: {} (interval {:?}, max wait {:?})",
            handle.name(),
            self.settings.poll_interval,
            self.settings.max_wait
        );

        let started = Instant::now();
        let deadline = started + self.settings.max_wait;
        let mut observed_states: Vec<JobState> = Vec::new();
        let mut highest_succeeded = 0;
        let mut succeeded_regressions = 0u32;
        let mut samples = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(handle));
            }

            let status = self.sample(handle, deadline).await?;
            samples += 1;

            let mut state =
                JobState::classify(&status, handle.completions(), handle.backoff_limit());
            if state == JobState::Pending
                && observed_states.iter().any(|s| *s != JobState::Pending)
            {
                // Pods can vanish between attempts; that is not a return to Pending.
                state = JobState::Running;
            }

            if status.succeeded < highest_succeeded {
                succeeded_regressions += 1;
                warn!(
                    "⚠️ Job {} reported {} succeeded pods after {}",
                    handle.name(),
                    status.succeeded,
                    highest_succeeded
                );
            }
            highest_succeeded = highest_succeeded.max(status.succeeded);

            debug!(
                "📊 Job: {}, state: {}, active: {}, succeeded: {}, failed: {}",
                handle.name(),
                state,
                status.active,
                status.succeeded,
                status.failed
            );

            if observed_states.last() != Some(&state) {
                if let Some(previous) = observed_states.last() {
                    info!("🔄 Job {}: {} -> {}", handle.name(), previous, state);
                }
                observed_states.push(state);
            }

            if state.is_terminal() {
                let elapsed = started.elapsed();
                match state {
                    JobState::Succeeded => {
                        info!("✅ Job completed successfully: {} in {:?}", handle.name(), elapsed)
                    }
                    _ => error!(
                        "❌ Job failed: {} ({})",
                        handle.name(),
                        status
                            .failure_reason
                            .as_deref()
                            .unwrap_or("no reason reported")
                    ),
                }
                return Ok(TerminalStatus {
                    state,
                    status,
                    samples,
                    elapsed,
                    observed_states,
                    succeeded_regressions,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timed_out(handle, format!("last state {}", state)));
            }

            let wake = (now + self.settings.poll_interval).min(deadline);
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(self.cancelled(handle)),
                _ = sleep_until(wake) => {}
            }
        }
    }

    /// Refresh the handle, retrying transient failures with exponential backoff.
    async fn sample(&self, handle: &mut JobHandle, deadline: Instant) -> Result<JobStatus> {
        let mut attempt = 0u32;
        loop {
            // A hung request must not outlive the deadline or the cancellation.
            let refreshed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(handle)),
                refreshed = handle.refresh(self.orchestrator) => refreshed.cloned(),
                _ = sleep_until(deadline) => {
                    return Err(self.timed_out(handle, "status query did not answer in time".to_string()))
                }
            };
            let err = match refreshed {
                Ok(status) => return Ok(status),
                Err(e) => e,
            };

            if !err.is_transient() || attempt >= self.settings.max_query_retries {
                error!("❌ Failed to get status of job {}: {}", handle.name(), err);
                return Err(AppError::PollError {
                    job_name: handle.name().to_string(),
                    kind: PollErrorKind::QueryFailed,
                    message: err.to_string(),
                });
            }

            let delay = self.settings.retry_backoff * 2u32.saturating_pow(attempt);
            attempt += 1;
            warn!(
                "⚠️ Status query for job {} failed (attempt {}/{}), retrying in {:?}: {}",
                handle.name(),
                attempt,
                self.settings.max_query_retries,
                delay,
                err
            );

            let wake = (Instant::now() + delay).min(deadline);
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(self.cancelled(handle)),
                _ = sleep_until(wake) => {}
            }
        }
    }

    fn timed_out(&self, handle: &JobHandle, detail: String) -> AppError {
        error!("⏰ Job timeout exceeded: {}", handle.name());
        AppError::PollError {
            job_name: handle.name().to_string(),
            kind: PollErrorKind::Timeout,
            message: format!(
                "job not terminal after {:?} ({})",
                self.settings.max_wait, detail
            ),
        }
    }

    fn cancelled(&self, handle: &JobHandle) -> AppError {
        warn!("🛑 Polling of job {} cancelled", handle.name());
        AppError::PollError {
            job_name: handle.name().to_string(),
            kind: PollErrorKind::Cancelled,
            message: "cancellation requested".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(active: i32, succeeded: i32, failed: i32) -> JobStatus {
        JobStatus {
            active,
            succeeded,
            failed,
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_lifecycle() {
        assert_eq!(JobState::classify(&status(0, 0, 0), 1, 6), JobState::Pending);
        assert_eq!(JobState::classify(&status(1, 0, 0), 1, 6), JobState::Running);
        assert_eq!(JobState::classify(&status(0, 1, 0), 1, 6), JobState::Succeeded);
    }

    #[test]
    fn test_classify_respects_completions() {
        assert_eq!(JobState::classify(&status(1, 2, 0), 3, 6), JobState::Running);
        assert_eq!(JobState::classify(&status(0, 3, 0), 3, 6), JobState::Succeeded);
    }

    #[test]
    fn test_classify_failure_budget() {
        assert_eq!(JobState::classify(&status(1, 0, 6), 1, 6), JobState::Running);
        assert_eq!(JobState::classify(&status(0, 0, 7), 1, 6), JobState::Failed);
        assert_eq!(JobState::classify(&status(0, 0, 1), 1, 0), JobState::Failed);

        let flagged = JobStatus {
            failed_condition: true,
            ..Default::default()
        };
        assert_eq!(JobState::classify(&flagged, 1, 6), JobState::Failed);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Pending.is_terminal());
    }

    #[test]
    fn test_default_settings() {
        let settings = PollSettings::default();
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.max_query_retries, 3);

        let custom = PollSettings::new(Duration::from_secs(2), Duration::from_secs(60))
            .with_retries(0, Duration::from_millis(10));
        assert_eq!(custom.max_wait, Duration::from_secs(60));
        assert_eq!(custom.max_query_retries, 0);
    }
}
