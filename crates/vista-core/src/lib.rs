//! Vista Core Library
//!
//! Provides the installation orchestration engine: pre-flight checks,
//! the ordered provisioning pipeline, a single-slot background job runner
//! and the monitor that folds job output into caller-visible progress.

pub mod config;
pub mod error;
pub mod fs;
pub mod job;
pub mod monitor;
pub mod pipeline;
pub mod preflight;
pub mod protocol;
pub mod runtime;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Errors
    pub use crate::error::{SetupError, SetupResult};

    // Inputs
    pub use crate::types::{InstallRequest, SetupInput};

    // Configuration
    pub use crate::config::{ConfigStore, PersistedConfig, SetupSettings};

    // Protocol
    pub use crate::protocol::{OutputSink, ProgressEvent};

    // Filesystem
    pub use crate::fs::linker::{LinkEntry, LinkRecord, LinkReport};

    // Runtime
    pub use crate::runtime::{CommandRunner, RunnerSpec, SystemRunner};

    // Orchestration
    pub use crate::job::{JobId, JobManager, JobSnapshot, JobState};
    pub use crate::monitor::{Monitor, MonitorView, Outcome};
    pub use crate::pipeline::{Pipeline, StepKind};
}
