//! Terminal stage: persistence, dirty check, URLs and request resolution.

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

use crate::artifact::ArtifactSet;
use crate::error::{PipelineError, Result};
use crate::fingerprint::{base_name, fingerprint_segment, strip_fingerprint, PipelineIdentity};
use crate::serve::content_type_for;
use crate::storage::{parent_dir, Storage, StorageError};

/// What a commit did, by storage key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Keys written in this commit
    pub written: Vec<String>,
    /// Keys already current in storage
    pub unchanged: Vec<String>,
    /// Stale fingerprinted siblings deleted
    pub removed: Vec<String>,
}

impl CommitReport {
    /// Whether storage was left untouched.
    pub fn is_noop(&self) -> bool {
        self.written.is_empty() && self.removed.is_empty()
    }
}

/// A stored artifact resolved from a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedAsset {
    /// Storage key that was fetched
    pub name: String,
    pub content: Vec<u8>,
    pub content_type: &'static str,
}

/// Terminal stage writing to a [`Storage`] collaborator.
#[derive(Debug)]
pub struct Output {
    storage: Box<dyn Storage>,
    url_root: String,
    strip_prefix: Option<String>,
    last_committed: Option<String>,
}

impl Output {
    /// Output to `storage`, served from `/`.
    pub fn new(storage: Box<dyn Storage>) -> Self {
        Self { storage, url_root: "/".to_string(), strip_prefix: None, last_committed: None }
    }

    /// Public URL prefix for stored artifacts.
    pub fn with_url_root(mut self, url_root: impl Into<String>) -> Self {
        self.url_root = url_root.into();
        self
    }

    /// Remove this leading directory from artifact names before storing them.
    ///
    /// `assets` and `assets/` both strip `assets/js/app.js` to `js/app.js`.
    pub fn with_strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        self.strip_prefix = if prefix.is_empty() { None } else { Some(prefix) };
        self
    }

    pub fn url_root(&self) -> &str {
        &self.url_root
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Digest fingerprint of the last successful commit made by this process.
    pub fn last_committed(&self) -> Option<&str> {
        self.last_committed.as_deref()
    }

    /// Storage key for an artifact name.
    ///
    /// The strip prefix only applies on a whole path component.
    pub fn storage_name(&self, name: &str) -> String {
        let name = name.trim_start_matches('/');
        let stripped = self
            .strip_prefix
            .as_deref()
            .and_then(|prefix| name.strip_prefix(prefix))
            .and_then(|rest| rest.strip_prefix('/'));
        stripped.unwrap_or(name).trim_start_matches('/').to_string()
    }

    /// Storage keys for `names`, rejecting two names that land on one key.
    pub fn storage_keys<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<Vec<String>> {
        let mut seen: HashMap<String, &str> = HashMap::new();
        let mut keys = Vec::new();
        for name in names {
            let key = self.storage_name(name);
            if let Some(previous) = seen.insert(key.clone(), name) {
                return Err(PipelineError::configuration(format!(
                    "artifacts '{}' and '{}' both map to storage key '{}'",
                    previous, name, key
                )));
            }
            keys.push(key);
        }
        Ok(keys)
    }

    /// The stored key a request path (relative to the URL root) refers to.
    ///
    /// An exact key wins. Otherwise request and keys are compared by their
    /// unfingerprinted names, so a page rendered against an older run still
    /// finds the current output.
    pub fn resolve_key(&self, relative: &str, expected: &[String]) -> Option<String> {
        let wanted = relative.trim_start_matches('/');
        let keys: Vec<String> = expected.iter().map(|name| self.storage_name(name)).collect();
        if let Some(key) = keys.iter().find(|key| key.as_str() == wanted) {
            return Some(key.clone());
        }
        let wanted = base_name(wanted);
        keys.into_iter().find(|key| base_name(key) == wanted)
    }

    /// Public URL of an artifact name.
    pub fn public_url(&self, name: &str) -> String {
        let key = self.storage_name(name);
        if self.url_root.ends_with('/') {
            format!("{}{}", self.url_root, key)
        } else {
            format!("{}/{}", self.url_root, key)
        }
    }

    /// Whether storage is missing any expected artifact or holds another run's output.
    ///
    /// Presence counts as current. The fingerprint comparison only applies
    /// once this process has committed; it is what notices changes that do
    /// not alter the output names.
    pub fn is_dirty(&self, expected: &[String], identity: &PipelineIdentity) -> Result<bool> {
        if let Some(last) = &self.last_committed {
            if *last != identity.fingerprint {
                debug!(last = %last, current = %identity.fingerprint, "identity changed since last commit");
                return Ok(true);
            }
        }
        for name in expected {
            let key = self.storage_name(name);
            if !self.storage.exists(&key)? {
                debug!(key = %key, storage = %self.storage.describe(), "expected output missing");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Persist `artifacts`, skipping keys that are already current, then delete
    /// stale fingerprinted variants of the committed names.
    pub fn commit(&mut self, artifacts: &ArtifactSet, identity: &PipelineIdentity) -> Result<CommitReport> {
        let mut report = CommitReport::default();
        let fp = identity.fingerprint.as_str();
        let keys = self.storage_keys(artifacts.iter().map(|a| a.name()))?;

        for (artifact, key) in artifacts.iter().zip(&keys) {
            if self.is_current(key, artifact.content(), fp)? {
                report.unchanged.push(key.clone());
            } else {
                self.storage.store(key, artifact.content())?;
                report.written.push(key.clone());
            }
        }

        report.removed = self.collect_garbage(&keys)?;
        self.last_committed = Some(identity.fingerprint.clone());

        info!(
            storage = %self.storage.describe(),
            written = report.written.len(),
            unchanged = report.unchanged.len(),
            removed = report.removed.len(),
            "committed"
        );
        Ok(report)
    }

    /// A stored key is current when its name carries this run's fingerprint or
    /// its bytes already match.
    fn is_current(&self, key: &str, content: &[u8], fingerprint: &str) -> Result<bool> {
        if !self.storage.exists(key)? {
            return Ok(false);
        }
        if fingerprint_segment(key) == Some(fingerprint) {
            return Ok(true);
        }
        match self.storage.fetch(key) {
            Ok(stored) => Ok(stored == content),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn collect_garbage(&mut self, keys: &[String]) -> Result<Vec<String>> {
        let current: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let bases: HashSet<String> =
            keys.iter().filter(|k| fingerprint_segment(k).is_some()).map(|k| strip_fingerprint(k)).collect();
        if bases.is_empty() {
            return Ok(Vec::new());
        }

        let dirs: BTreeSet<&str> = keys.iter().map(|k| parent_dir(k)).collect();
        let mut removed = Vec::new();
        for dir in dirs {
            for sibling in self.storage.list(dir)? {
                if current.contains(sibling.as_str()) || fingerprint_segment(&sibling).is_none() {
                    continue;
                }
                if bases.contains(&strip_fingerprint(&sibling)) {
                    debug!(key = %sibling, "removing stale variant");
                    self.storage.delete(&sibling)?;
                    removed.push(sibling);
                }
            }
        }
        Ok(removed)
    }

    /// Resolve a request path (relative to the URL root) to stored bytes.
    pub fn serve(&self, relative: &str, expected: &[String]) -> Result<Option<ServedAsset>> {
        let Some(key) = self.resolve_key(relative, expected) else {
            return Ok(None);
        };

        match self.storage.fetch(&key) {
            Ok(content) => {
                let content_type = content_type_for(&key);
                Ok(Some(ServedAsset { name: key, content, content_type }))
            }
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
