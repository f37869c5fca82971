//! Directory linking into a single aggregation directory.
//!
//! Every immediate subdirectory of every source root gets one directory link
//! inside the aggregation directory. Existing entries are never touched:
//! the existence test runs before each create, so "already there" and
//! "could not create" stay distinguishable.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

/// A link created in the aggregation directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub name: String,
    pub link: PathBuf,
    pub target: PathBuf,
}

/// What happened to one candidate, in processing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRecord {
    Linked(LinkEntry),
    /// An entry already existed at the destination name.
    Skipped {
        name: String,
        source: PathBuf,
        /// Root that provided the name earlier in the same run, if any.
        claimed_by: Option<PathBuf>,
    },
    Failed {
        name: String,
        source: PathBuf,
        error: String,
    },
    MissingRoot(PathBuf),
}

impl fmt::Display for LinkRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkRecord::Linked(entry) => write!(
                f,
                "Linked {} -> {}",
                entry.link.display(),
                entry.target.display()
            ),
            LinkRecord::Skipped {
                name,
                claimed_by: Some(root),
                ..
            } => write!(
                f,
                "Skipped '{}': already provided by {}",
                name,
                root.display()
            ),
            LinkRecord::Skipped { name, .. } => {
                write!(f, "Skipped '{}': destination already exists", name)
            }
            LinkRecord::Failed {
                name,
                source,
                error,
            } => write!(
                f,
                "Failed to link '{}' ({}): {}",
                name,
                source.display(),
                error
            ),
            LinkRecord::MissingRoot(root) => {
                write!(f, "Source folder not found, skipping: {}", root.display())
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinkReport {
    pub records: Vec<LinkRecord>,
}

impl LinkReport {
    pub fn linked(&self) -> impl Iterator<Item = &LinkEntry> {
        self.records.iter().filter_map(|record| match record {
            LinkRecord::Linked(entry) => Some(entry),
            _ => None,
        })
    }

    pub fn skipped_count(&self) -> usize {
        self.records
            .iter()
            .filter(|record| matches!(record, LinkRecord::Skipped { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.records
            .iter()
            .filter(|record| matches!(record, LinkRecord::Failed { .. }))
            .count()
    }

    pub fn changed(&self) -> bool {
        self.linked().next().is_some()
    }
}

/// Link every subdirectory of each root into `aggregation_dir`.
///
/// Roots are processed in the given order and subdirectories by name. A
/// missing root or a failed link is recorded and processing continues; only
/// failing to create or read the aggregation directory itself is an error.
pub fn link_roots(roots: &[PathBuf], aggregation_dir: &Path) -> anyhow::Result<LinkReport> {
    fs::create_dir_all(aggregation_dir).with_context(|| {
        format!(
            "Failed to create aggregation directory: {}",
            aggregation_dir.display()
        )
    })?;

    let mut report = LinkReport::default();
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();

    for root in roots {
        if !root.is_dir() {
            info!(root = %root.display(), "source root missing, skipping");
            report.records.push(LinkRecord::MissingRoot(root.clone()));
            continue;
        }

        let subdirs = match list_subdirs(root) {
            Ok(subdirs) => subdirs,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "failed to enumerate source root");
                report.records.push(LinkRecord::Failed {
                    name: String::new(),
                    source: root.clone(),
                    error: format!("{err:#}"),
                });
                continue;
            }
        };

        for (name, source) in subdirs {
            let record = link_one(&name, &source, aggregation_dir, claimed.get(&name));
            if let LinkRecord::Linked(_) = record {
                claimed.insert(name, root.clone());
            }
            report.records.push(record);
        }
    }

    Ok(report)
}

fn link_one(
    name: &str,
    source: &Path,
    aggregation_dir: &Path,
    claimed_by: Option<&PathBuf>,
) -> LinkRecord {
    let link = aggregation_dir.join(name);

    if entry_exists(&link) {
        match claimed_by {
            Some(root) => warn!(
                name,
                source = %source.display(),
                claimed_by = %root.display(),
                "name collision between source roots, keeping first"
            ),
            None => debug!(name, link = %link.display(), "destination exists, skipping"),
        }
        return LinkRecord::Skipped {
            name: name.to_string(),
            source: source.to_path_buf(),
            claimed_by: claimed_by.cloned(),
        };
    }

    match create_dir_symlink(source, &link) {
        Ok(()) => {
            info!(name, target = %source.display(), "linked");
            LinkRecord::Linked(LinkEntry {
                name: name.to_string(),
                link,
                target: source.to_path_buf(),
            })
        }
        Err(err) => {
            warn!(name, error = %err, "failed to create link");
            LinkRecord::Failed {
                name: name.to_string(),
                source: source.to_path_buf(),
                error: err.to_string(),
            }
        }
    }
}

/// Any filesystem entry counts, including a dangling link.
fn entry_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn list_subdirs(root: &Path) -> anyhow::Result<Vec<(String, PathBuf)>> {
    let mut subdirs = Vec::new();
    for entry in
        fs::read_dir(root).with_context(|| format!("Failed to read dir: {}", root.display()))?
    {
        let entry =
            entry.with_context(|| format!("Failed to read dir entry: {}", root.display()))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        subdirs.push((entry.file_name().to_string_lossy().into_owned(), path));
    }
    subdirs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(subdirs)
}

#[cfg(unix)]
fn create_dir_symlink(src_dir: &Path, dst_link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src_dir, dst_link)
}

/// NTFS directory junction.
#[cfg(windows)]
fn create_dir_symlink(src_dir: &Path, dst_link: &Path) -> std::io::Result<()> {
    junction::create(src_dir, dst_link)
}

#[cfg(not(any(unix, windows)))]
fn create_dir_symlink(_src_dir: &Path, _dst_link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "Directory links are not supported on this platform",
    ))
}
