//! URL manifest written by `assetpipe build` and read by precomputed catalogs.
//!
//! # Manifest Format
//!
//! One JSON file per environment, mapping each pipeline to the public URLs of
//! its outputs in declaration order:
//!
//! ```json
//! {
//!   "css": ["/static/site.0123456789abcdef.css"],
//!   "js": ["/static/app.js", "/static/vendor.js"]
//! }
//! ```
//!
//! The file for environment `prod` next to a configured `assets.json` is
//! `assets.prod.json`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use crate::build::BuildResult;

/// Error during manifest operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// IO error
    #[error("IO error on {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    /// JSON parsing error
    #[error("JSON error in {path:?}: {source}")]
    Json { path: PathBuf, source: serde_json::Error },
}

/// Pipeline name to public URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlManifest {
    pipelines: IndexMap<String, Vec<String>>,
}

impl UrlManifest {
    /// Create a new empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the URLs of every successful pipeline in a build.
    pub fn from_build(result: &BuildResult) -> Self {
        let mut manifest = Self::new();
        for pipeline in result.pipelines.iter().filter(|p| p.is_success()) {
            manifest.insert(pipeline.pipeline.clone(), pipeline.urls.clone());
        }
        manifest
    }

    /// Set the URLs of a pipeline.
    pub fn insert(&mut self, pipeline: impl Into<String>, urls: Vec<String>) {
        self.pipelines.insert(pipeline.into(), urls);
    }

    /// URLs recorded for a pipeline.
    pub fn urls(&self, pipeline: &str) -> Option<&[String]> {
        self.pipelines.get(pipeline).map(Vec::as_slice)
    }

    /// Recorded pipeline names, in insertion order.
    pub fn pipelines(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Load a manifest from a file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let file = File::open(path).map_err(|source| ManifestError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|source| ManifestError::Json { path: path.to_path_buf(), source })
    }

    /// Write the manifest, replacing any previous file in one step.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let io_err = |source| ManifestError::Io { path: path.to_path_buf(), source };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err)?;

        let json = serde_json::to_vec_pretty(self)
            .map_err(|source| ManifestError::Json { path: path.to_path_buf(), source })?;
        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        temp.write_all(&json).map_err(io_err)?;
        temp.write_all(b"\n").map_err(io_err)?;
        temp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

/// Per-environment manifest path: `<stem>.<env lowercased>.<ext>`.
pub fn manifest_path(base: &Path, environment: &str) -> PathBuf {
    let env = environment.to_lowercase();
    let stem = base.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "assets".to_string());
    let file = match base.extension() {
        Some(ext) => format!("{}.{}.{}", stem, env, ext.to_string_lossy()),
        None => format!("{}.{}", stem, env),
    };
    base.with_file_name(file)
}
