//! Error taxonomy for setup requests.
//!
//! Validation, conflict and extraction failures surface synchronously to the
//! caller that initiated a run. Step failures never cross into the caller:
//! they end a job in [`JobState::Failed`](crate::job::JobState::Failed) and are
//! reported through the job's output instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    /// Required caller input is missing or unusable.
    #[error("Invalid setup input: {0}")]
    Validation(String),

    /// A job is already pending or running.
    #[error("A setup job is already active (job {active})")]
    Conflict { active: u64 },

    /// The bundled resource archive could not be extracted.
    #[error("Failed to extract bundled resources from {archive}")]
    ResourceExtraction {
        archive: String,
        #[source]
        source: anyhow::Error,
    },

    /// A fatal pipeline step failure.
    #[error("Step '{step}' failed")]
    Step {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl SetupError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Short machine-friendly name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            SetupError::Validation(_) => "validation",
            SetupError::Conflict { .. } => "conflict",
            SetupError::ResourceExtraction { .. } => "resource_extraction",
            SetupError::Step { .. } => "step",
        }
    }
}

pub type SetupResult<T> = std::result::Result<T, SetupError>;
