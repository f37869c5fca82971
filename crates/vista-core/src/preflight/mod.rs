//! Pre-flight stage.
//!
//! Runs synchronously on the caller's context before any job exists:
//! validates caller input into an [`InstallRequest`] and extracts the
//! optional bundled archive into the project root. Any error here means no
//! job is started.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::SetupSettings;
use crate::error::{SetupError, SetupResult};
use crate::fs::{absolutize, extract_archive};
use crate::runtime::resolve_interpreter;
use crate::types::{InstallRequest, SetupInput};

/// What happened to the bundled archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleStatus {
    Absent { archive: PathBuf },
    Extracted { archive: PathBuf, files: usize },
}

impl BundleStatus {
    pub fn describe(&self) -> String {
        match self {
            BundleStatus::Absent { archive } => format!(
                "No bundled resources at {}; skipping extraction",
                archive.display()
            ),
            BundleStatus::Extracted { archive, files } => {
                format!("Extracted {} files from {}", files, archive.display())
            }
        }
    }
}

/// Outcome of a successful pre-flight.
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub request: InstallRequest,
    pub settings: SetupSettings,
    pub bundle: BundleStatus,
}

/// Validate input, load project settings and extract the bundle.
pub fn run(input: &SetupInput) -> SetupResult<PreflightReport> {
    let cwd = std::env::current_dir()
        .map_err(|e| SetupError::validation(format!("cannot determine current directory: {e}")))?;
    let request = validate(input, &cwd)?;
    let settings = SetupSettings::load(request.project_root())
        .map_err(|e| SetupError::validation(format!("{e:#}")))?;
    let bundle = extract_bundle(request.project_root(), &settings)?;
    Ok(PreflightReport {
        request,
        settings,
        bundle,
    })
}

/// Validate caller input, auto-detecting the interpreter on `PATH` when needed.
pub fn validate(input: &SetupInput, cwd: &Path) -> SetupResult<InstallRequest> {
    validate_with(input, cwd, || resolve_interpreter(None))
}

/// Validate caller input with a custom interpreter detector.
pub fn validate_with<F>(input: &SetupInput, cwd: &Path, detect: F) -> SetupResult<InstallRequest>
where
    F: FnOnce() -> Option<String>,
{
    let project_root = match &input.project_root {
        Some(root) => resolve_path(&root.to_string_lossy(), cwd)?
            .ok_or_else(|| SetupError::validation("project root is blank"))?,
        None => cwd.to_path_buf(),
    };
    if !project_root.is_dir() {
        return Err(SetupError::validation(format!(
            "project root is not a directory: {}",
            project_root.display()
        )));
    }

    let mut source_roots = Vec::with_capacity(input.source_roots.len());
    for raw in &input.source_roots {
        if let Some(path) = resolve_path(raw, cwd)? {
            source_roots.push(path);
        }
    }
    if source_roots.is_empty() {
        return Err(SetupError::validation("at least one source folder is required"));
    }

    let aggregation_dir = resolve_path(&input.aggregation_dir, cwd)?
        .ok_or_else(|| SetupError::validation("aggregation folder is required"))?;

    let interpreter = match input.interpreter.as_deref().map(str::trim) {
        Some(explicit) if !explicit.is_empty() => explicit.to_string(),
        _ => detect().ok_or_else(|| {
            SetupError::validation("no Python interpreter given and none found on PATH")
        })?,
    };

    Ok(InstallRequest::new(
        source_roots,
        aggregation_dir,
        interpreter,
        project_root,
    ))
}

/// Extract the bundled archive into the project root if it exists.
pub fn extract_bundle(project_root: &Path, settings: &SetupSettings) -> SetupResult<BundleStatus> {
    let archive = settings.bundle_archive_path(project_root);
    if !archive.is_file() {
        info!(archive = %archive.display(), "no bundled archive, skipping extraction");
        return Ok(BundleStatus::Absent { archive });
    }

    let files = extract_archive(&archive, project_root).map_err(|source| {
        SetupError::ResourceExtraction {
            archive: archive.display().to_string(),
            source,
        }
    })?;
    info!(archive = %archive.display(), files, "bundled archive extracted");
    Ok(BundleStatus::Extracted { archive, files })
}

fn resolve_path(raw: &str, cwd: &Path) -> SetupResult<Option<PathBuf>> {
    absolutize(raw, cwd).map_err(|e| SetupError::validation(format!("{e:#}")))
}
