//! Config store for loading and saving `.vista/config.json`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::paths::config_path;

/// The durable record shared with the served application.
///
/// Only `media_root_dir` is owned by setup; every other key found in an
/// existing file is carried through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_root_dir: Option<PathBuf>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
    project_root: PathBuf,
}

impl ConfigStore {
    pub fn from_project_root(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            config_path: config_path(&project_root),
            project_root,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn load(&self) -> anyhow::Result<PersistedConfig> {
        if !self.config_path.exists() {
            return Ok(PersistedConfig::default());
        }
        let content = std::fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;
        serde_json::from_str(&content).with_context(|| {
            format!("Failed to parse config file: {}", self.config_path.display())
        })
    }

    /// Write the config atomically.
    ///
    /// The content goes to a sibling temp file which is then renamed over the
    /// target, so readers see either the previous file or the complete new one.
    /// An existing file is backed up first.
    pub fn save(&self, config: &PersistedConfig) -> anyhow::Result<()> {
        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize config to JSON")?;
        let parent = self.config_path.parent().ok_or_else(|| {
            anyhow::anyhow!("Config path has no parent: {}", self.config_path.display())
        })?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;

        if self.config_path.exists()
            && let Err(err) = self.backup()
        {
            warn!(error = %format!("{err:#}"), "could not back up existing config");
        }

        let tmp = parent.join(format!(
            ".{}.tmp.{}",
            super::paths::CONFIG_FILE,
            std::process::id()
        ));
        if let Err(err) = std::fs::write(&tmp, content) {
            let _ = std::fs::remove_file(&tmp);
            return Err(anyhow::Error::new(err)
                .context(format!("Failed to write temp config: {}", tmp.display())));
        }
        if let Err(err) = std::fs::rename(&tmp, &self.config_path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(anyhow::Error::new(err).context(format!(
                "Failed to replace config file: {}",
                self.config_path.display()
            )));
        }
        Ok(())
    }

    /// Record the aggregation directory, keeping every other key.
    ///
    /// An unreadable existing file is replaced (after backup) rather than
    /// blocking the write.
    pub fn persist_media_root(&self, media_root: &Path) -> anyhow::Result<PersistedConfig> {
        let mut config = match self.load() {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "existing config unreadable, starting fresh");
                PersistedConfig::default()
            }
        };
        config.media_root_dir = Some(media_root.to_path_buf());
        self.save(&config)?;
        info!(path = %self.config_path.display(), media_root = %media_root.display(), "config saved");
        Ok(config)
    }

    /// Copy the current file to `config.json.bak.<timestamp>`.
    pub fn backup(&self) -> anyhow::Result<PathBuf> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let mut name = self.config_path.as_os_str().to_os_string();
        name.push(format!(".bak.{stamp}"));
        let backup = PathBuf::from(name);
        std::fs::copy(&self.config_path, &backup).with_context(|| {
            format!(
                "Failed to back up {} to {}",
                self.config_path.display(),
                backup.display()
            )
        })?;
        Ok(backup)
    }
}
