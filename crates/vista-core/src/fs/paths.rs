//! Path normalization for caller-supplied locations.

use std::path::{Path, PathBuf};

use anyhow::Context;

/// Expand a leading `~` and make the path absolute against `base`.
///
/// Returns `None` for blank input. The path does not need to exist.
pub fn absolutize(raw: &str, base: &Path) -> anyhow::Result<Option<PathBuf>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let expanded = expand_home(trimmed)?;
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };

    let absolute = std::path::absolute(&joined)
        .with_context(|| format!("Failed to resolve absolute path: {}", joined.display()))?;
    Ok(Some(absolute))
}

fn expand_home(raw: &str) -> anyhow::Result<PathBuf> {
    let rest = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => rest,
        _ => return Ok(PathBuf::from(raw)),
    };

    let home = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory to expand '~'"))?;
    Ok(home.join(rest.trim_start_matches(['/', '\\'])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_input_is_none() {
        assert_eq!(absolutize("   ", Path::new("/base")).unwrap(), None);
    }

    #[test]
    fn relative_paths_join_base() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let resolved = absolutize("media", tmp.path()).unwrap().unwrap();
        assert_eq!(resolved, tmp.path().join("media"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let resolved = absolutize("~/Shows", Path::new("/unused")).unwrap().unwrap();
        assert_eq!(resolved, home.join("Shows"));
    }

    #[test]
    fn tilde_user_is_left_alone() {
        let resolved = absolutize("~other/x", Path::new("/base")).unwrap().unwrap();
        assert!(resolved.ends_with("~other/x"));
    }
}
