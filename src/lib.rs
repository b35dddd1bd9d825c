//! kube-job-runner - run a multi-stage batch workload as a Kubernetes Job
//!
//! This library submits a Job built from ordered init stages and a main stage
//! sharing an ephemeral volume, waits for it to finish, collects the pod logs
//! and removes what it created.

pub mod config;
pub mod error;
pub mod kubernetes;
pub mod logging;

// Re-export commonly used types
pub use error::{AppError, OrchestratorError, PollErrorKind, Result};
