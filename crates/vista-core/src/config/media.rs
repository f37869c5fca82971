//! Which directory the served application exposes as media.
//!
//! Mirrors the reader side of `.vista/config.json`: the configured directory
//! if it exists, otherwise `media_all` under the project root, otherwise
//! media serving is off.

use std::path::{Path, PathBuf};

use super::paths::FALLBACK_MEDIA_DIR;
use super::store::PersistedConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRoot {
    Configured(PathBuf),
    Fallback(PathBuf),
    Disabled,
}

impl MediaRoot {
    pub fn path(&self) -> Option<&Path> {
        match self {
            MediaRoot::Configured(path) | MediaRoot::Fallback(path) => Some(path),
            MediaRoot::Disabled => None,
        }
    }
}

pub fn resolve_media_root(config: &PersistedConfig, project_root: &Path) -> MediaRoot {
    if let Some(dir) = &config.media_root_dir
        && dir.is_dir()
    {
        return MediaRoot::Configured(dir.clone());
    }

    let fallback = project_root.join(FALLBACK_MEDIA_DIR);
    if fallback.is_dir() {
        return MediaRoot::Fallback(fallback);
    }
    MediaRoot::Disabled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_dir_wins_when_present() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let media = tmp.path().join("lib");
        std::fs::create_dir_all(&media).unwrap();
        std::fs::create_dir_all(tmp.path().join(FALLBACK_MEDIA_DIR)).unwrap();

        let config = PersistedConfig {
            media_root_dir: Some(media.clone()),
            ..Default::default()
        };

        assert_eq!(
            resolve_media_root(&config, tmp.path()),
            MediaRoot::Configured(media)
        );
    }

    #[test]
    fn missing_configured_dir_falls_back() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let fallback = tmp.path().join(FALLBACK_MEDIA_DIR);
        std::fs::create_dir_all(&fallback).unwrap();

        let config = PersistedConfig {
            media_root_dir: Some(tmp.path().join("gone")),
            ..Default::default()
        };

        assert_eq!(
            resolve_media_root(&config, tmp.path()),
            MediaRoot::Fallback(fallback)
        );
    }

    #[test]
    fn nothing_available_disables_media() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let root = resolve_media_root(&PersistedConfig::default(), tmp.path());
        assert_eq!(root, MediaRoot::Disabled);
        assert!(root.path().is_none());
    }
}
