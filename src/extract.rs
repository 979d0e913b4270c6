use std::io::{Read, Seek};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;
use zip::ZipArchive;

use crate::domain::PathRegistry;
use crate::error::RetrieveError;
use crate::fs_util::{DEFAULT_DIR_MODE, Filesystem};
use crate::merge;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractSummary {
    pub written: usize,
    pub merged: usize,
    pub directories: usize,
    pub skipped: usize,
}

/// Unpacks one archive under `target_root`.
///
/// Paths already present in `registry` were written by an earlier archive of
/// the same run; their existing content is JSON-merged with the entry instead
/// of being overwritten. Entries sitting directly at the archive root are
/// skipped. The first failure aborts the archive and nothing is rolled back.
pub fn extract_archive<R: Read + Seek>(
    reader: R,
    target_root: &Utf8Path,
    registry: &mut PathRegistry,
    fs: &dyn Filesystem,
) -> Result<ExtractSummary, RetrieveError> {
    let mut archive =
        ZipArchive::new(reader).map_err(|err| RetrieveError::ArchiveOpen(err.to_string()))?;

    if !target_root.as_str().is_empty() {
        fs.create_dir(target_root, Some(DEFAULT_DIR_MODE))?;
    }

    let mut summary = ExtractSummary::default();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| RetrieveError::ArchiveOpen(format!("entry #{index}: {err}")))?;
        let name = entry.name().to_string();
        let relative = entry_relative_path(&name, entry.enclosed_name())?;
        let destination = target_root.join(&relative);
        let already_written = registry.register(&destination);

        let Some(parent) = relative.parent().filter(|parent| !parent.as_str().is_empty()) else {
            debug!(entry = %name, "skipping entry at archive root");
            summary.skipped += 1;
            continue;
        };
        fs.create_dir(&target_root.join(parent), None)?;

        if entry.is_dir() {
            let mode = entry.unix_mode().map(|mode| mode & 0o7777);
            fs.create_dir(&destination, mode)?;
            summary.directories += 1;
            continue;
        }

        if already_written {
            debug!(entry = %name, path = %destination, "augmenting existing file with more data");
            let existing = fs.read_file(&destination)?;
            let mut incoming = Vec::new();
            entry
                .read_to_end(&mut incoming)
                .map_err(|err| RetrieveError::ArchiveOpen(format!("read {name}: {err}")))?;
            let merged = merge::merge(&existing, &incoming).map_err(|err| match err {
                RetrieveError::Merge(message) => {
                    RetrieveError::Merge(format!("{destination}: {message}"))
                }
                other => other,
            })?;
            fs.create_file(&destination, &mut merged.as_slice())?;
            summary.merged += 1;
        } else {
            debug!(entry = %name, path = %destination, "creating file");
            fs.create_file(&destination, &mut entry)?;
            summary.written += 1;
        }
    }

    Ok(summary)
}

fn entry_relative_path(
    name: &str,
    enclosed: Option<std::path::PathBuf>,
) -> Result<Utf8PathBuf, RetrieveError> {
    let enclosed = enclosed.ok_or_else(|| {
        RetrieveError::ArchiveOpen(format!("zip entry path traversal detected: {name}"))
    })?;
    Utf8PathBuf::from_path_buf(enclosed)
        .map_err(|_| RetrieveError::ArchiveOpen(format!("non-utf8 entry name: {name}")))
}
