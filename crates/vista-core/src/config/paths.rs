//! Well-known locations relative to the project root.

use std::path::{Path, PathBuf};

/// Hidden project-level directory shared with the served application.
pub const APP_DIR: &str = ".vista";
pub const CONFIG_FILE: &str = "config.json";
pub const SETTINGS_FILE: &str = "vista-setup.toml";
/// Conventional media directory used when nothing is configured.
pub const FALLBACK_MEDIA_DIR: &str = "media_all";

pub fn app_dir(project_root: &Path) -> PathBuf {
    project_root.join(APP_DIR)
}

pub fn config_path(project_root: &Path) -> PathBuf {
    app_dir(project_root).join(CONFIG_FILE)
}

pub fn settings_path(project_root: &Path) -> PathBuf {
    project_root.join(SETTINGS_FILE)
}
