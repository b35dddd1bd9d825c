use std::fmt;

/// Why the status poller stopped before observing a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollErrorKind {
    Timeout,
    QueryFailed,
    Cancelled,
}

impl fmt::Display for PollErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollErrorKind::Timeout => write!(f, "timeout"),
            PollErrorKind::QueryFailed => write!(f, "query failed"),
            PollErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Job submission failed: {message}")]
    SubmissionError { message: String },

    #[error("Polling job {job_name} stopped ({kind}): {message}")]
    PollError {
        job_name: String,
        kind: PollErrorKind,
        message: String,
    },

    #[error("Log retrieval failed for job {job_name}: {message}")]
    LogRetrievalError { job_name: String, message: String },

    #[error("Cleanup of job {job_name} failed: {}", .failures.join("; "))]
    CleanupError {
        job_name: String,
        failures: Vec<String>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Kubernetes error: {0}")]
    KubernetesError(String),
}

impl AppError {
    /// Name of the job this error refers to, when one was already created.
    pub fn job_name(&self) -> Option<&str> {
        match self {
            AppError::PollError { job_name, .. }
            | AppError::LogRetrievalError { job_name, .. }
            | AppError::CleanupError { job_name, .. } => Some(job_name),
            _ => None,
        }
    }

    pub fn poll_kind(&self) -> Option<PollErrorKind> {
        match self {
            AppError::PollError { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::ConfigError(format!("IO error: {}", err))
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::ValidationError(format!("YAML error: {}", err))
    }
}

impl From<kube::config::KubeconfigError> for AppError {
    fn from(err: kube::config::KubeconfigError) -> Self {
        AppError::ConfigError(format!("Kubeconfig error: {}", err))
    }
}

impl From<kube::Error> for AppError {
    fn from(err: kube::Error) -> Self {
        AppError::KubernetesError(err.to_string())
    }
}

/// Failure reported by an [`Orchestrator`](crate::kubernetes::Orchestrator) call.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rejected by the API server: {0}")]
    Rejected(String),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl OrchestratorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, OrchestratorError::NotFound(_))
    }

    /// Errors worth retrying: throttling, server-side failures and transport hiccups.
    pub fn is_transient(&self) -> bool {
        match self {
            OrchestratorError::Api { code, .. } => *code == 429 || *code >= 500,
            OrchestratorError::Transport(_) => true,
            _ => false,
        }
    }

    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            404 => OrchestratorError::NotFound(message),
            401 | 403 => OrchestratorError::Forbidden(message),
            400 | 409 | 422 => OrchestratorError::Rejected(message),
            _ => OrchestratorError::Api { code, message },
        }
    }
}

impl From<kube::Error> for OrchestratorError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => {
                OrchestratorError::from_status(response.code, response.message)
            }
            other => OrchestratorError::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
