//! Last-run clock stores for watch-gated stages.
//!
//! A clock store maps a watcher id to the time its stage last completed a
//! run. [`MemoryClock`] lives for the process; [`JsonFileClock`] keeps the
//! map in a small JSON file so the gate survives restarts.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Error reading or writing a clock store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClockError {
    /// IO error
    #[error("clock store I/O error at {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    /// JSON error
    #[error("clock store {path:?} is corrupt: {source}")]
    Json { path: PathBuf, source: serde_json::Error },
}

/// Key-value store of last-run timestamps.
pub trait ClockStore: std::fmt::Debug {
    /// When `watcher_id` last ran, if ever.
    fn get(&self, watcher_id: &str) -> Result<Option<SystemTime>, ClockError>;

    /// Record that `watcher_id` ran at `at`.
    fn set(&mut self, watcher_id: &str, at: SystemTime) -> Result<(), ClockError>;
}

/// Process-local clock store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryClock {
    times: Arc<Mutex<BTreeMap<String, SystemTime>>>,
}

impl MemoryClock {
    /// Create an empty clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClockStore for MemoryClock {
    fn get(&self, watcher_id: &str) -> Result<Option<SystemTime>, ClockError> {
        let times = self.times.lock().unwrap_or_else(|p| p.into_inner());
        Ok(times.get(watcher_id).copied())
    }

    fn set(&mut self, watcher_id: &str, at: SystemTime) -> Result<(), ClockError> {
        let mut times = self.times.lock().unwrap_or_else(|p| p.into_inner());
        times.insert(watcher_id.to_string(), at);
        Ok(())
    }
}

/// Clock store persisted as a JSON object in a file.
#[derive(Debug, Clone)]
pub struct JsonFileClock {
    path: PathBuf,
}

impl JsonFileClock {
    /// Use (or create on first write) the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, SystemTime>, ClockError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(ClockError::Io { path: self.path.clone(), source }),
        };
        serde_json::from_str(&text)
            .map_err(|source| ClockError::Json { path: self.path.clone(), source })
    }

    fn save(&self, times: &BTreeMap<String, SystemTime>) -> Result<(), ClockError> {
        let io_err = |source| ClockError::Io { path: self.path.clone(), source };
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err)?;

        let json = serde_json::to_vec_pretty(times)
            .map_err(|source| ClockError::Json { path: self.path.clone(), source })?;
        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        temp.write_all(&json).map_err(io_err)?;
        temp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl ClockStore for JsonFileClock {
    fn get(&self, watcher_id: &str) -> Result<Option<SystemTime>, ClockError> {
        Ok(self.load()?.get(watcher_id).copied())
    }

    fn set(&mut self, watcher_id: &str, at: SystemTime) -> Result<(), ClockError> {
        let mut times = self.load()?;
        times.insert(watcher_id.to_string(), at);
        self.save(&times)
    }
}
