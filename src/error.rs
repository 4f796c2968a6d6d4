use thiserror::Error;

use crate::anthropic::AnthropicError;
use crate::state_machine::JobStatus;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Research,
    Draft,
    Qa,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Research => write!(f, "research"),
            Stage::Draft => write!(f, "draft"),
            Stage::Qa => write!(f, "qa"),
            Stage::Persist => write!(f, "persist"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("An active job already exists for this topic: {job_id} ({status})")]
    DuplicateJob { job_id: String, status: JobStatus },

    #[error("{stage} stage failed: {message}")]
    StageFailure { stage: Stage, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No pending job matches `{0}`")]
    NotFound(String),

    #[error("`{prefix}` matches {count} pending jobs, be more specific")]
    Ambiguous { prefix: String, count: usize },

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Content engine error: {0}")]
    Engine(#[from] EngineError),
}

impl PipelineError {
    /// Stable machine-readable code for callers and logs.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::DuplicateJob { .. } => "duplicate",
            PipelineError::StageFailure { .. } => "stage_failure",
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Ambiguous { .. } => "ambiguous",
            PipelineError::Timeout(_) => "timeout",
            PipelineError::Worker(_) => "worker",
            PipelineError::Store(_) => "store",
            PipelineError::Engine(_) => "engine",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Refusing status change {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Anthropic API error: {0}")]
    Anthropic(#[from] AnthropicError),

    #[error("Unparsable engine response: {0}")]
    Parse(String),

    #[error("Engine produced no content")]
    Empty,

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Target returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Target rejected the request: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_failure_display() {
        let err = PipelineError::StageFailure {
            stage: Stage::Draft,
            message: "engine unavailable".into(),
        };
        assert_eq!(err.to_string(), "draft stage failed: engine unavailable");
    }

    #[test]
    fn ambiguous_display() {
        let err = PipelineError::Ambiguous {
            prefix: "ab".into(),
            count: 3,
        };
        assert_eq!(err.to_string(), "`ab` matches 3 pending jobs, be more specific");
    }

    #[test]
    fn invalid_transition_display() {
        let err = StoreError::InvalidTransition {
            from: JobStatus::Published,
            to: JobStatus::Qa,
        };
        assert_eq!(err.to_string(), "Refusing status change Published -> QA");
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(PipelineError::Timeout(600).code(), "timeout");
        assert_eq!(PipelineError::NotFound("ab".into()).code(), "not_found");
        let dup = PipelineError::DuplicateJob {
            job_id: "abc".into(),
            status: JobStatus::Review,
        };
        assert_eq!(dup.code(), "duplicate");
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PipelineError>();
        assert_send_sync::<PublishError>();
    }
}
