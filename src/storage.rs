//! Storage collaborators for committed artifacts.
//!
//! The pipeline core only talks to the [`Storage`] trait. Two backends ship
//! with the crate:
//!
//! - [`MemoryStorage`]: the "null" outputter, useful for tests and dry runs.
//! - [`FilesystemStorage`]: files under a root directory. Writes go to a
//!   temporary file in the destination directory and are renamed into place,
//!   so a concurrent reader sees either the old file or the complete new one.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Error from a storage backend.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StorageError {
    /// No artifact stored under this name.
    #[error("'{0}' not found in storage")]
    NotFound(String),
    /// The name would escape the storage root or is otherwise unusable.
    #[error("invalid storage name '{0}'")]
    InvalidName(String),
    /// The backend is locked for writing.
    #[error("storage is read-only; refusing to write '{0}'")]
    ReadOnly(String),
    /// Underlying I/O failure.
    #[error("storage I/O error at {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// Persistence backend for final artifacts.
///
/// Names are `/`-separated relative paths.
pub trait Storage: std::fmt::Debug {
    /// Whether an artifact is stored under `name`.
    fn exists(&self, name: &str) -> Result<bool, StorageError>;

    /// Store `content` under `name`, replacing any previous content.
    fn store(&mut self, name: &str, content: &[u8]) -> Result<(), StorageError>;

    /// Fetch the content stored under `name`.
    fn fetch(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Remove `name`. Removing a missing name is not an error.
    fn delete(&mut self, name: &str) -> Result<(), StorageError>;

    /// Names stored directly inside `dir` ("" for the root), sorted.
    fn list(&self, dir: &str) -> Result<Vec<String>, StorageError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Whether a backend accepts writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageAccess {
    /// Writes allowed.
    #[default]
    ReadWrite,
    /// Writes rejected until [`FilesystemStorage::unlock`] is called.
    ReadOnly,
}

/// Reject absolute names and names with `..` or empty components.
fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name.starts_with('/') || name.contains('\\') {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    for component in Path::new(name).components() {
        if !matches!(component, Component::Normal(_)) {
            return Err(StorageError::InvalidName(name.to_string()));
        }
    }
    Ok(())
}

/// Directory part of a `/`-separated name ("" at the root).
pub fn parent_dir(name: &str) -> &str {
    name.rfind('/').map(|i| &name[..i]).unwrap_or("")
}

/// In-memory storage.
///
/// Clones share the same contents, so a test can keep a handle after giving
/// the storage to a pipeline.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    files: BTreeMap<String, Vec<u8>>,
    writes: usize,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All stored names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// Number of `store` calls performed so far.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.lock().files.contains_key(name))
    }

    fn store(&mut self, name: &str, content: &[u8]) -> Result<(), StorageError> {
        validate_name(name)?;
        let mut inner = self.lock();
        inner.files.insert(name.to_string(), content.to_vec());
        inner.writes += 1;
        Ok(())
    }

    fn fetch(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        self.lock().files.get(name).cloned().ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn delete(&mut self, name: &str) -> Result<(), StorageError> {
        self.lock().files.remove(name);
        Ok(())
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        Ok(self.lock().files.keys().filter(|name| parent_dir(name) == dir).cloned().collect())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Storage rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: PathBuf,
    access: StorageAccess,
}

impl FilesystemStorage {
    /// Writable storage under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), access: StorageAccess::ReadWrite }
    }

    /// Storage under `root` that rejects writes until unlocked.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), access: StorageAccess::ReadOnly }
    }

    /// Allow writes.
    pub fn unlock(&mut self) {
        self.access = StorageAccess::ReadWrite;
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current access mode.
    pub fn access(&self) -> StorageAccess {
        self.access
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

impl Storage for FilesystemStorage {
    fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.path_for(name)?.is_file())
    }

    fn store(&mut self, name: &str, content: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(name)?;
        if self.access == StorageAccess::ReadOnly {
            return Err(StorageError::ReadOnly(name.to_string()));
        }

        let dir = path.parent().unwrap_or(self.root.as_path()).to_path_buf();
        let io_err = |source| StorageError::Io { path: path.clone(), source };
        fs::create_dir_all(&dir).map_err(io_err)?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        temp.write_all(content).map_err(io_err)?;
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    fn fetch(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(name)?;
        fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            _ => StorageError::Io { path, source },
        })
    }

    fn delete(&mut self, name: &str) -> Result<(), StorageError> {
        let path = self.path_for(name)?;
        if self.access == StorageAccess::ReadOnly {
            return Err(StorageError::ReadOnly(name.to_string()));
        }
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        let path = if dir.is_empty() { self.root.clone() } else { self.path_for(dir)? };
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::Io { path: path.clone(), source })?;
            if !entry.path().is_file() {
                continue;
            }
            let file = entry.file_name().to_string_lossy().into_owned();
            if dir.is_empty() {
                names.push(file);
            } else {
                names.push(format!("{}/{}", dir, file));
            }
        }
        names.sort();
        Ok(names)
    }

    fn describe(&self) -> String {
        format!("filesystem:{}", self.root.display())
    }
}
