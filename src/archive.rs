use std::fs::File;
use std::io::{self, Cursor, Seek, Write};
use std::path::{MAIN_SEPARATOR, Path};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::RetrieveError;

/// A file to place in an in-memory archive. Names ending in `/` become
/// directory entries.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    pub name: String,
    pub body: Vec<u8>,
    /// Unix permission bits recorded on the entry.
    pub mode: Option<u32>,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Packs the file or directory at `source` into a ZIP written to `writer`.
///
/// Entry names are relative to the parent of `source`, so the archive holds
/// the source directory as its single top-level item. When `source` ends with
/// a separator the directory's contents sit at the archive root instead.
/// Only regular files become entries.
///
/// The archive is assembled in a temporary file and copied to `writer` once
/// complete; if anything fails nothing reaches `writer`.
pub fn archive<W: Write>(source: &Path, mut writer: W) -> Result<(), RetrieveError> {
    let spool = tempfile::tempfile().map_err(|err| RetrieveError::ArchiveWrite(err.to_string()))?;
    let mut zip = ZipWriter::new(spool);
    let base = archive_base(source);

    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|err| RetrieveError::ArchiveWrite(err.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(base)
            .map_err(|err| RetrieveError::ArchiveWrite(err.to_string()))?;
        let name = archive_name(relative);
        let mut file = File::open(entry.path()).map_err(|err| {
            RetrieveError::ArchiveWrite(format!("open {}: {err}", entry.path().display()))
        })?;
        zip.start_file(name.as_str(), entry_options())
            .map_err(|err| RetrieveError::ArchiveWrite(format!("{name}: {err}")))?;
        io::copy(&mut file, &mut zip)
            .map_err(|err| RetrieveError::ArchiveWrite(format!("{name}: {err}")))?;
    }

    let mut spool = zip
        .finish()
        .map_err(|err| RetrieveError::ArchiveWrite(err.to_string()))?;
    spool
        .rewind()
        .map_err(|err| RetrieveError::ArchiveWrite(err.to_string()))?;
    io::copy(&mut spool, &mut writer).map_err(|err| RetrieveError::ArchiveWrite(err.to_string()))?;
    writer
        .flush()
        .map_err(|err| RetrieveError::ArchiveWrite(err.to_string()))
}

/// Builds an archive holding `files`, in order, and returns it ready to read.
pub fn build_from_memory(files: &[MemoryFile]) -> Result<Cursor<Vec<u8>>, RetrieveError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for file in files {
        let options = match file.mode {
            Some(mode) => entry_options().unix_permissions(mode),
            None => entry_options(),
        };
        if file.name.ends_with('/') {
            zip.add_directory(file.name.as_str(), options)
                .map_err(|err| RetrieveError::ArchiveWrite(format!("{}: {err}", file.name)))?;
            continue;
        }
        zip.start_file(file.name.as_str(), options)
            .map_err(|err| RetrieveError::ArchiveWrite(format!("{}: {err}", file.name)))?;
        zip.write_all(&file.body)
            .map_err(|err| RetrieveError::ArchiveWrite(format!("{}: {err}", file.name)))?;
    }
    let mut cursor = zip
        .finish()
        .map_err(|err| RetrieveError::ArchiveWrite(err.to_string()))?;
    cursor.set_position(0);
    Ok(cursor)
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn archive_base(source: &Path) -> &Path {
    let raw = source.as_os_str().to_string_lossy();
    if raw.ends_with('/') || raw.ends_with(MAIN_SEPARATOR) {
        return source;
    }
    source.parent().unwrap_or_else(|| Path::new(""))
}

fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
