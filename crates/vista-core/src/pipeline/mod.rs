//! Ordered provisioning steps.
//!
//! Steps run strictly in [`StepKind::ALL`] order. Each announces itself with a
//! progress line carrying its target percent, then performs real filesystem
//! and process work. Nothing is rolled back: a fatal failure stops the
//! sequence and leaves earlier effects in place, and every step is safe to
//! repeat on the next run.

mod project;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use tracing::{info, warn};

use crate::config::{ConfigStore, SetupSettings};
use crate::fs::linker::{LinkRecord, link_roots};
use crate::protocol::OutputSink;
use crate::runtime::{CommandRunner, Interpreter, RunnerSpec, run_checked, venv_python};
use crate::types::InstallRequest;

pub use project::{package_manifest, server_entry_source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    CreateEnvironment,
    InstallRequirements,
    WritePackageManifest,
    WriteServerEntry,
    InstallServerDependencies,
    LinkSources,
    PersistConfig,
    GenerateContent,
}

impl StepKind {
    pub const ALL: [StepKind; 8] = [
        StepKind::CreateEnvironment,
        StepKind::InstallRequirements,
        StepKind::WritePackageManifest,
        StepKind::WriteServerEntry,
        StepKind::InstallServerDependencies,
        StepKind::LinkSources,
        StepKind::PersistConfig,
        StepKind::GenerateContent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StepKind::CreateEnvironment => "create-environment",
            StepKind::InstallRequirements => "install-requirements",
            StepKind::WritePackageManifest => "write-package-manifest",
            StepKind::WriteServerEntry => "write-server-entry",
            StepKind::InstallServerDependencies => "install-server-dependencies",
            StepKind::LinkSources => "link-sources",
            StepKind::PersistConfig => "persist-config",
            StepKind::GenerateContent => "generate-content",
        }
    }

    /// Target percent announced when the step starts.
    pub fn percent(self) -> f64 {
        match self {
            StepKind::CreateEnvironment => 5.0,
            StepKind::InstallRequirements => 15.0,
            StepKind::WritePackageManifest => 35.0,
            StepKind::WriteServerEntry => 40.0,
            StepKind::InstallServerDependencies => 45.0,
            StepKind::LinkSources => 65.0,
            StepKind::PersistConfig => 80.0,
            StepKind::GenerateContent => 85.0,
        }
    }

    pub fn status(self) -> &'static str {
        match self {
            StepKind::CreateEnvironment => "Creating Python virtual environment...",
            StepKind::InstallRequirements => "Installing Python dependencies...",
            StepKind::WritePackageManifest => "Writing package.json...",
            StepKind::WriteServerEntry => "Writing server.js...",
            StepKind::InstallServerDependencies => "Installing server dependencies...",
            StepKind::LinkSources => "Linking media folders...",
            StepKind::PersistConfig => "Saving configuration...",
            StepKind::GenerateContent => "Generating pages...",
        }
    }
}

/// How a pipeline execution ended.
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed,
    /// A stop was requested; `next` never started.
    Stopped { next: StepKind },
    Failed {
        step: StepKind,
        error: anyhow::Error,
    },
}

pub const STATUS_COMPLETED: &str = "Installation complete";
pub const STATUS_FAILED: &str = "Installation failed";
pub const STATUS_STOPPED: &str = "Installation stopped";

/// One run's worth of provisioning work.
#[derive(Debug, Clone)]
pub struct Pipeline {
    request: InstallRequest,
    settings: SetupSettings,
    runner: Arc<dyn CommandRunner>,
}

impl Pipeline {
    pub fn new(
        request: InstallRequest,
        settings: SetupSettings,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            request,
            settings,
            runner,
        }
    }

    pub fn request(&self) -> &InstallRequest {
        &self.request
    }

    pub fn settings(&self) -> &SetupSettings {
        &self.settings
    }

    /// Run every step in order.
    ///
    /// `stop` is checked before each step only; a running step always
    /// finishes. A fatal failure leaves an `ERROR:` line in `out` and a final
    /// progress line at 100 before returning.
    pub fn execute(&self, out: &OutputSink, stop: &AtomicBool) -> PipelineOutcome {
        for step in StepKind::ALL {
            if stop.load(Ordering::SeqCst) {
                info!(next = step.name(), "stop requested, not starting further steps");
                out.log(format!(
                    "Stop requested; skipping '{}' and remaining steps",
                    step.name()
                ));
                out.progress(100.0, STATUS_STOPPED);
                return PipelineOutcome::Stopped { next: step };
            }

            out.progress(step.percent(), step.status());
            info!(step = step.name(), "step started");

            if let Err(error) = self.run_step(step, out) {
                warn!(step = step.name(), error = %format!("{error:#}"), "step failed");
                out.log(format!("ERROR: {} failed: {:#}", step.name(), error));
                out.progress(100.0, STATUS_FAILED);
                return PipelineOutcome::Failed { step, error };
            }
        }

        out.progress(100.0, STATUS_COMPLETED);
        PipelineOutcome::Completed
    }

    /// Run a single step, applying its failure policy.
    pub fn run_step(&self, step: StepKind, out: &OutputSink) -> anyhow::Result<()> {
        match step {
            StepKind::CreateEnvironment => self.create_environment(out),
            StepKind::InstallRequirements => self.install_requirements(out),
            StepKind::WritePackageManifest => self.write_package_manifest(out),
            StepKind::WriteServerEntry => self.write_server_entry(out),
            StepKind::InstallServerDependencies => self.install_server_dependencies(out),
            StepKind::LinkSources => self.link_sources(out),
            StepKind::PersistConfig => self.persist_config(out),
            StepKind::GenerateContent => self.generate_content(out),
        }
    }

    fn root(&self) -> &std::path::Path {
        self.request.project_root()
    }

    fn venv_python(&self) -> std::path::PathBuf {
        venv_python(&self.settings.venv_path(self.root()))
    }

    fn create_environment(&self, out: &OutputSink) -> anyhow::Result<()> {
        let interpreter = Interpreter::parse(self.request.interpreter()).ok_or_else(|| {
            anyhow::anyhow!("Invalid interpreter invocation: '{}'", self.request.interpreter())
        })?;
        let venv = self.settings.venv_path(self.root());

        let spec = interpreter
            .spec(["-m".to_string(), "venv".to_string(), venv.display().to_string()])
            .current_dir(self.root());
        out.log(format!("> {}", spec.display()));
        run_checked(self.runner.as_ref(), &spec, out)?;

        let python = self.venv_python();
        if !python.is_file() {
            anyhow::bail!(
                "Virtual environment interpreter not found at {}",
                python.display()
            );
        }
        out.log(format!("Virtual environment ready: {}", venv.display()));
        Ok(())
    }

    fn install_requirements(&self, out: &OutputSink) -> anyhow::Result<()> {
        let requirements = self.settings.requirements_path(self.root());
        if !requirements.is_file() {
            info!(path = %requirements.display(), "no dependency manifest, skipping");
            out.log(format!(
                "{} not found; skipping Python dependencies",
                requirements.display()
            ));
            return Ok(());
        }

        let spec = RunnerSpec::new(
            self.venv_python().display().to_string(),
            vec![
                "-m".into(),
                "pip".into(),
                "install".into(),
                "-r".into(),
                requirements.display().to_string(),
            ],
        )
        .current_dir(self.root());
        out.log(format!("> {}", spec.display()));
        run_checked(self.runner.as_ref(), &spec, out)
    }

    fn write_package_manifest(&self, out: &OutputSink) -> anyhow::Result<()> {
        let server_dir = self.settings.server_path(self.root());
        std::fs::create_dir_all(&server_dir).with_context(|| {
            format!("Failed to create server directory: {}", server_dir.display())
        })?;

        let path = server_dir.join("package.json");
        let content = serde_json::to_string_pretty(&package_manifest())
            .context("Failed to serialize package.json")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        out.log(format!("Wrote {}", path.display()));
        Ok(())
    }

    fn write_server_entry(&self, out: &OutputSink) -> anyhow::Result<()> {
        let server_dir = self.settings.server_path(self.root());
        std::fs::create_dir_all(&server_dir).with_context(|| {
            format!("Failed to create server directory: {}", server_dir.display())
        })?;

        let path = server_dir.join("server.js");
        let source = server_entry_source(self.root(), &self.settings);
        std::fs::write(&path, source)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        out.log(format!("Wrote {}", path.display()));
        Ok(())
    }

    fn install_server_dependencies(&self, out: &OutputSink) -> anyhow::Result<()> {
        let spec = RunnerSpec::new(self.settings.node_command.clone(), vec!["install".into()])
            .current_dir(self.settings.server_path(self.root()));
        out.log(format!("> {}", spec.display()));
        run_checked(self.runner.as_ref(), &spec, out)
    }

    fn link_sources(&self, out: &OutputSink) -> anyhow::Result<()> {
        let aggregation_dir = self.request.aggregation_dir();
        let report = link_roots(self.request.source_roots(), aggregation_dir)?;

        for record in &report.records {
            match record {
                LinkRecord::Skipped { .. } | LinkRecord::MissingRoot(_) => {
                    out.log(format!("[skip] {record}"))
                }
                LinkRecord::Failed { .. } => out.log(format!("[warn] {record}")),
                LinkRecord::Linked(_) => out.log(record.to_string()),
            }
        }
        out.log(format!(
            "Linked {} folder(s) into {} ({} skipped, {} failed)",
            report.linked().count(),
            aggregation_dir.display(),
            report.skipped_count(),
            report.failed_count()
        ));
        Ok(())
    }

    fn persist_config(&self, out: &OutputSink) -> anyhow::Result<()> {
        let store = ConfigStore::from_project_root(self.root());
        store.persist_media_root(self.request.aggregation_dir())?;
        out.log(format!(
            "Saved media_root_dir = {} to {}",
            self.request.aggregation_dir().display(),
            store.config_path().display()
        ));
        Ok(())
    }

    fn generate_content(&self, out: &OutputSink) -> anyhow::Result<()> {
        let entry = self.settings.content_entry_path(self.root());
        let mut args = vec![
            entry.display().to_string(),
            "--media-root".to_string(),
            self.request.aggregation_dir().display().to_string(),
        ];
        args.extend(self.settings.content_args.iter().cloned());

        let spec = RunnerSpec::new(self.venv_python().display().to_string(), args)
            .current_dir(self.root())
            .env("PYTHONUNBUFFERED", "1");
        out.log(format!("> {}", spec.display()));
        run_checked(self.runner.as_ref(), &spec, out)
    }
}
