//! Zip archive extraction.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use anyhow::Context;

/// Extract a zip archive at `archive` into `dest`.
///
/// Entries whose names would escape `dest` are skipped. Returns the number of
/// files written.
pub fn extract_archive(archive: &Path, dest: &Path) -> anyhow::Result<usize> {
    let file = File::open(archive)
        .with_context(|| format!("Failed to open archive: {}", archive.display()))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Failed to read zip archive: {}", archive.display()))?;

    std::fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create extract directory: {}", dest.display()))?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .with_context(|| format!("Failed to read zip entry {}", i))?;

        let outpath = match file.enclosed_name() {
            Some(path) => dest.join(path),
            None => {
                tracing::warn!(entry = file.name(), "skipping zip entry with unsafe path");
                continue;
            }
        };

        if file.is_dir() {
            std::fs::create_dir_all(&outpath)
                .with_context(|| format!("Failed to create directory: {}", outpath.display()))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory: {}", parent.display())
            })?;
        }

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read zip entry: {}", file.name()))?;

        let mut outfile = File::create(&outpath)
            .with_context(|| format!("Failed to create file: {}", outpath.display()))?;
        outfile
            .write_all(&buffer)
            .with_context(|| format!("Failed to write file: {}", outpath.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
            }
        }

        written += 1;
    }

    Ok(written)
}
