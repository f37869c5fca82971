//! Installer settings loaded from `vista-setup.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::paths::settings_path;

const MIN_POLL_MS: u64 = 500;
const MAX_POLL_MS: u64 = 1000;

/// Tunables for the provisioning pipeline.
///
/// Relative paths are resolved against the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SetupSettings {
    /// Optional bundled archive extracted during pre-flight.
    pub bundle_archive: PathBuf,
    /// Isolated interpreter environment.
    pub venv_dir: PathBuf,
    /// Optional dependency manifest for the interpreter environment.
    pub requirements: PathBuf,
    /// Directory of the generated served application.
    pub server_dir: PathBuf,
    /// Package manager used to install the served application's dependencies.
    pub node_command: String,
    /// Downstream content-generation script.
    pub content_entry: PathBuf,
    /// Extra arguments appended to the content-generation invocation.
    pub content_args: Vec<String>,
    /// Port baked into the generated server.
    pub server_port: u16,
    /// Monitor tick, clamped to 500..=1000 ms.
    pub poll_interval_ms: u64,
}

impl Default for SetupSettings {
    fn default() -> Self {
        Self {
            bundle_archive: PathBuf::from("resources.zip"),
            venv_dir: PathBuf::from(".venv"),
            requirements: PathBuf::from("requirements.txt"),
            server_dir: PathBuf::from("server"),
            node_command: default_node_command().to_string(),
            content_entry: PathBuf::from("src").join("main.py"),
            content_args: vec!["--skip-ui".to_string()],
            server_port: 3000,
            poll_interval_ms: 750,
        }
    }
}

fn default_node_command() -> &'static str {
    if cfg!(windows) { "npm.cmd" } else { "npm" }
}

impl SetupSettings {
    /// Load settings for a project, falling back to defaults when the file is absent.
    pub fn load(project_root: &Path) -> anyhow::Result<Self> {
        let path = settings_path(project_root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let settings: SetupSettings =
            toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.node_command.trim().is_empty() {
            anyhow::bail!("node_command must not be empty");
        }
        if self.content_entry.as_os_str().is_empty() {
            anyhow::bail!("content_entry must not be empty");
        }
        if self.server_port == 0 {
            anyhow::bail!("server_port must be a non-zero port");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.clamp(MIN_POLL_MS, MAX_POLL_MS))
    }

    pub fn bundle_archive_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.bundle_archive)
    }

    pub fn venv_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.venv_dir)
    }

    pub fn requirements_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.requirements)
    }

    pub fn server_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.server_dir)
    }

    pub fn content_entry_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.content_entry)
    }
}

/// Enhance TOML parsing errors with the offending line
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();
    let Some(span) = error.span() else {
        return anyhow::anyhow!("TOML parsing error: {}", message);
    };

    let line_num = content[..span.start.min(content.len())]
        .matches('\n')
        .count()
        + 1;
    let line = content.lines().nth(line_num - 1).unwrap_or_default();
    anyhow::anyhow!(
        "TOML parsing error at line {}:\n  {} | {}\n\nError: {}",
        line_num,
        line_num,
        line,
        message
    )
}
