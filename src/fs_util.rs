use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Read};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::RetrieveError;

pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// File operations the extractor needs. Swappable so extraction can run
/// against an in-memory tree in tests.
pub trait Filesystem: Send + Sync {
    /// Creates or truncates `path` and fills it from `content`.
    fn create_file(&self, path: &Utf8Path, content: &mut dyn Read) -> Result<(), RetrieveError>;
    /// Creates `path` and any missing parents. Existing directories are left as they are.
    fn create_dir(&self, path: &Utf8Path, mode: Option<u32>) -> Result<(), RetrieveError>;
    fn read_file(&self, path: &Utf8Path) -> Result<Vec<u8>, RetrieveError>;
    /// Removes `path` recursively. Missing paths are not an error.
    fn remove_dir_all(&self, path: &Utf8Path) -> Result<(), RetrieveError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    fn create_file(&self, path: &Utf8Path, content: &mut dyn Read) -> Result<(), RetrieveError> {
        let mut file = fs::File::create(path.as_std_path())
            .map_err(|err| RetrieveError::Filesystem(format!("create {path}: {err}")))?;
        io::copy(content, &mut file)
            .map_err(|err| RetrieveError::Filesystem(format!("write {path}: {err}")))?;
        Ok(())
    }

    fn create_dir(&self, path: &Utf8Path, mode: Option<u32>) -> Result<(), RetrieveError> {
        if path.as_std_path().is_dir() {
            return Ok(());
        }
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode.unwrap_or(DEFAULT_DIR_MODE));
        }
        #[cfg(not(unix))]
        let _ = mode;
        builder
            .create(path.as_std_path())
            .map_err(|err| RetrieveError::Filesystem(format!("create dir {path}: {err}")))
    }

    fn read_file(&self, path: &Utf8Path) -> Result<Vec<u8>, RetrieveError> {
        fs::read(path.as_std_path())
            .map_err(|err| RetrieveError::Filesystem(format!("read {path}: {err}")))
    }

    fn remove_dir_all(&self, path: &Utf8Path) -> Result<(), RetrieveError> {
        if path.as_std_path().exists() {
            fs::remove_dir_all(path.as_std_path())
                .map_err(|err| RetrieveError::Filesystem(format!("remove {path}: {err}")))?;
        }
        Ok(())
    }
}

/// In-memory tree used by tests.
#[derive(Debug, Default)]
pub struct MemoryFs {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<Utf8PathBuf, Vec<u8>>,
    dirs: BTreeMap<Utf8PathBuf, u32>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a file, creating its parent directories.
    pub fn insert_file(&self, path: impl AsRef<Utf8Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let mut state = self.lock();
        if let Some(parent) = path.parent() {
            state.add_dir_chain(parent, DEFAULT_DIR_MODE);
        }
        state.files.insert(path.to_path_buf(), content.into());
    }

    pub fn file(&self, path: impl AsRef<Utf8Path>) -> Option<Vec<u8>> {
        self.lock().files.get(path.as_ref()).cloned()
    }

    pub fn file_string(&self, path: impl AsRef<Utf8Path>) -> Option<String> {
        self.file(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn has_dir(&self, path: impl AsRef<Utf8Path>) -> bool {
        self.lock().dirs.contains_key(path.as_ref())
    }

    pub fn dir_mode(&self, path: impl AsRef<Utf8Path>) -> Option<u32> {
        self.lock().dirs.get(path.as_ref()).copied()
    }

    pub fn paths(&self) -> BTreeSet<Utf8PathBuf> {
        self.lock().files.keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MemoryState {
    fn add_dir_chain(&mut self, path: &Utf8Path, mode: u32) {
        for ancestor in path.ancestors() {
            if ancestor.as_str().is_empty() || self.dirs.contains_key(ancestor) {
                continue;
            }
            self.dirs.insert(ancestor.to_path_buf(), mode);
        }
    }
}

impl Filesystem for MemoryFs {
    fn create_file(&self, path: &Utf8Path, content: &mut dyn Read) -> Result<(), RetrieveError> {
        let mut buffer = Vec::new();
        content
            .read_to_end(&mut buffer)
            .map_err(|err| RetrieveError::Filesystem(format!("write {path}: {err}")))?;
        let mut state = self.lock();
        let parent_missing = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .is_some_and(|parent| !state.dirs.contains_key(parent));
        if parent_missing {
            return Err(RetrieveError::Filesystem(format!(
                "create {path}: parent directory does not exist"
            )));
        }
        state.files.insert(path.to_path_buf(), buffer);
        Ok(())
    }

    fn create_dir(&self, path: &Utf8Path, mode: Option<u32>) -> Result<(), RetrieveError> {
        self.lock()
            .add_dir_chain(path, mode.unwrap_or(DEFAULT_DIR_MODE));
        Ok(())
    }

    fn read_file(&self, path: &Utf8Path) -> Result<Vec<u8>, RetrieveError> {
        self.file(path)
            .ok_or_else(|| RetrieveError::Filesystem(format!("read {path}: file not found")))
    }

    fn remove_dir_all(&self, path: &Utf8Path) -> Result<(), RetrieveError> {
        let mut state = self.lock();
        state.files.retain(|file, _| !file.starts_with(path));
        state.dirs.retain(|dir, _| !dir.starts_with(path));
        Ok(())
    }
}
