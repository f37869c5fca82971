//! Shared input types for a setup run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Raw caller input, as supplied by the presentation layer.
///
/// Nothing here is trusted yet; [`crate::preflight`] validates it into an
/// [`InstallRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetupInput {
    /// Directories whose immediate subdirectories are linked, in priority order.
    pub source_roots: Vec<String>,
    /// Directory that receives one link per subdirectory.
    pub aggregation_dir: String,
    /// Interpreter invocation (path or command). Auto-detected when `None` or blank.
    pub interpreter: Option<String>,
    /// Project root. Defaults to the current directory when `None`.
    pub project_root: Option<PathBuf>,
}

/// Validated, immutable input to one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    source_roots: Vec<PathBuf>,
    aggregation_dir: PathBuf,
    interpreter: String,
    project_root: PathBuf,
}

impl InstallRequest {
    pub fn new(
        source_roots: Vec<PathBuf>,
        aggregation_dir: PathBuf,
        interpreter: String,
        project_root: PathBuf,
    ) -> Self {
        Self {
            source_roots,
            aggregation_dir,
            interpreter,
            project_root,
        }
    }

    pub fn source_roots(&self) -> &[PathBuf] {
        &self.source_roots
    }

    pub fn aggregation_dir(&self) -> &Path {
        &self.aggregation_dir
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}
