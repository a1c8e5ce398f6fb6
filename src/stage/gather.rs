//! Root stage: resolves input specifiers and reads them into artifacts.
//!
//! Glob-bearing specifiers are expanded when the stage is constructed (and
//! again on [`Gather::refresh`]); literal paths pass through unresolved, so a
//! missing literal file only fails when the execute pass tries to read it.

use glob::{glob, Pattern};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::artifact::{Artifact, ArtifactSet};
use crate::error::{PipelineError, Result};
use crate::fingerprint::{digest_hex, pipeline_input_hash, InputMode, StageFingerprint};

/// One declared input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    /// Literal path or glob pattern, relative to the pipeline root unless absolute.
    Path(String),
    /// Content supplied in memory under a name.
    Inline { name: String, content: Vec<u8> },
}

impl InputSpec {
    /// Path or glob specifier.
    pub fn path(spec: impl Into<String>) -> Self {
        InputSpec::Path(spec.into())
    }

    /// In-memory content.
    pub fn inline(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        InputSpec::Inline { name: name.into(), content: content.into() }
    }
}

impl From<&str> for InputSpec {
    fn from(spec: &str) -> Self {
        InputSpec::Path(spec.to_string())
    }
}

/// A resolved input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A file, named by its path relative to the root (or absolute).
    File { name: String },
    /// In-memory content.
    Inline { name: String, content: Arc<[u8]> },
}

impl InputSource {
    /// File input.
    pub fn file(name: impl Into<String>) -> Self {
        InputSource::File { name: name.into() }
    }

    /// Inline input.
    pub fn inline(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        InputSource::Inline { name: name.into(), content: Arc::from(content.into()) }
    }

    /// Artifact name this input produces.
    pub fn name(&self) -> &str {
        match self {
            InputSource::File { name } | InputSource::Inline { name, .. } => name,
        }
    }

    /// Filesystem location of a file input.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        root.join(self.name())
    }

    /// Whether this input lives on disk.
    pub fn is_file(&self) -> bool {
        matches!(self, InputSource::File { .. })
    }

    /// Read the input into an artifact.
    pub fn read(&self, root: &Path) -> Result<Artifact> {
        match self {
            InputSource::Inline { name, content } => Ok(Artifact::new(name.clone(), content.to_vec())),
            InputSource::File { name } => {
                let path = self.resolve(root);
                let bytes = fs::read(&path).map_err(|e| PipelineError::input(&path, e))?;
                Ok(Artifact::new(name.clone(), bytes))
            }
        }
    }
}

/// Whether a specifier contains glob metacharacters.
pub fn has_glob_meta(spec: &str) -> bool {
    spec.contains(['*', '?', '['])
}

/// Render a path as a `/`-separated name, relative to `root` when below it.
fn name_for(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
        .replace("//", "/")
}

/// The root stage.
#[derive(Debug, Clone)]
pub struct Gather {
    root: PathBuf,
    specs: Vec<InputSpec>,
    mode: InputMode,
    inputs: Vec<InputSource>,
    fingerprint: String,
}

impl Gather {
    /// Resolve `specs` against `root`.
    ///
    /// Returns a configuration error for malformed glob patterns.
    pub fn new(root: impl Into<PathBuf>, specs: Vec<InputSpec>, mode: InputMode) -> Result<Self> {
        let root = root.into();
        let fingerprint = StageFingerprint::new("Gather")
            .args(specs.iter().map(spec_label))
            .option("mode", mode)
            .finish();
        let inputs = resolve_specs(&root, &specs)?;
        Ok(Self { root, specs, mode, inputs, fingerprint })
    }

    /// Gather from paths/globs with mtime-based invalidation.
    pub fn paths<I, S>(root: impl Into<PathBuf>, specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let specs = specs.into_iter().map(|s| InputSpec::Path(s.into())).collect();
        Self::new(root, specs, InputMode::Mtime)
    }

    /// Re-expand glob specifiers, picking up added or removed files.
    pub fn refresh(&mut self) -> Result<()> {
        self.inputs = resolve_specs(&self.root, &self.specs)?;
        Ok(())
    }

    /// Resolved inputs in discovery order.
    pub fn inputs(&self) -> &[InputSource] {
        &self.inputs
    }

    /// Base directory for relative specifiers.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Invalidation mode.
    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Digest of the stage's configuration.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Names the execute pass will produce.
    pub fn predict(&self) -> Vec<String> {
        self.inputs.iter().map(|i| i.name().to_string()).collect()
    }

    /// Digest of the resolved inputs plus any extra files stages read.
    pub fn input_hash(&self, extra: &[InputSource]) -> String {
        if extra.is_empty() {
            return pipeline_input_hash(&self.inputs, &self.root, self.mode);
        }
        let mut all = self.inputs.clone();
        all.extend_from_slice(extra);
        pipeline_input_hash(&all, &self.root, self.mode)
    }

    /// Read every resolved input, in order.
    pub fn execute(&self) -> Result<ArtifactSet> {
        let mut set = ArtifactSet::new();
        for input in &self.inputs {
            let artifact = input.read(&self.root)?;
            debug!(name = artifact.name(), bytes = artifact.len(), "gathered input");
            super::push_unique(&mut set, artifact, "gather")?;
        }
        Ok(set)
    }

    /// Directories a watcher should observe to notice input changes.
    pub fn watch_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for spec in &self.specs {
            let InputSpec::Path(spec) = spec else { continue };
            let dir = if has_glob_meta(spec) {
                let static_part: Vec<&str> =
                    spec.split('/').take_while(|part| !has_glob_meta(part)).collect();
                self.root.join(static_part.join("/"))
            } else {
                match self.root.join(spec).parent() {
                    Some(parent) => parent.to_path_buf(),
                    None => self.root.clone(),
                }
            };
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }

    /// Whether a changed file could affect this stage's inputs.
    pub fn matches(&self, path: &Path) -> bool {
        let name = name_for(path, &self.root);
        self.specs.iter().any(|spec| match spec {
            InputSpec::Inline { .. } => false,
            InputSpec::Path(spec) if has_glob_meta(spec) => {
                Pattern::new(spec).map(|p| p.matches(&name)).unwrap_or(false)
            }
            InputSpec::Path(spec) => name_for(Path::new(spec), Path::new("")) == name,
        })
    }
}

/// Label used for a specifier in the stage fingerprint.
fn spec_label(spec: &InputSpec) -> String {
    match spec {
        InputSpec::Path(path) => path.clone(),
        InputSpec::Inline { name, content } => format!("inline:{}:{}", name, digest_hex(content)),
    }
}

fn resolve_specs(root: &Path, specs: &[InputSpec]) -> Result<Vec<InputSource>> {
    let mut seen = HashSet::new();
    let mut inputs = Vec::new();

    let mut push = |source: InputSource, inputs: &mut Vec<InputSource>| {
        if seen.insert(source.name().to_string()) {
            inputs.push(source);
        }
    };

    for spec in specs {
        match spec {
            InputSpec::Inline { name, content } => {
                push(InputSource::inline(name.clone(), content.clone()), &mut inputs);
            }
            InputSpec::Path(spec) if has_glob_meta(spec) => {
                let matches = expand_glob(root, spec)?;
                if matches.is_empty() {
                    warn!(pattern = %spec, root = %root.display(), "glob matched no files");
                }
                for name in matches {
                    push(InputSource::file(name), &mut inputs);
                }
            }
            InputSpec::Path(spec) => {
                push(InputSource::file(name_for(Path::new(spec), Path::new(""))), &mut inputs);
            }
        }
    }
    Ok(inputs)
}

/// Expand one glob pattern to file names, in the glob crate's sorted order.
fn expand_glob(root: &Path, pattern: &str) -> Result<Vec<String>> {
    let full_pattern = root.join(pattern);
    let pattern_str = full_pattern.to_string_lossy();

    let paths = glob(&pattern_str).map_err(|e| {
        PipelineError::configuration(format!("invalid glob pattern '{}': {}", pattern, e))
    })?;

    let mut names = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => names.push(name_for(&path, root)),
            Ok(_) => {}
            Err(e) => warn!("error reading path while expanding '{}': {}", pattern, e),
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(&path).unwrap().write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_literal_passes_through_unresolved() {
        let temp = TempDir::new().unwrap();
        let gather = Gather::paths(temp.path(), ["missing.css"]).unwrap();
        assert_eq!(gather.predict(), vec!["missing.css"]);

        let err = gather.execute().unwrap_err();
        assert!(matches!(err, PipelineError::InputResolution { .. }));
    }

    #[test]
    fn test_glob_expansion_relative_names() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "css/b.css", "b");
        create_test_file(temp.path(), "css/a.css", "a");
        create_test_file(temp.path(), "css/skip.js", "");

        let gather = Gather::paths(temp.path(), ["css/*.css"]).unwrap();
        assert_eq!(gather.predict(), vec!["css/a.css", "css/b.css"]);
    }

    #[test]
    fn test_glob_expansion_is_deterministic() {
        let temp = TempDir::new().unwrap();
        for name in ["x/3.js", "x/1.js", "x/deep/2.js", "x/0.js"] {
            create_test_file(temp.path(), name, "");
        }

        let first = Gather::paths(temp.path(), ["x/**/*.js"]).unwrap().predict();
        for _ in 0..5 {
            assert_eq!(Gather::paths(temp.path(), ["x/**/*.js"]).unwrap().predict(), first);
        }
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_declaration_order_and_dedup() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "js/a.js", "");
        create_test_file(temp.path(), "js/b.js", "");

        let gather = Gather::paths(temp.path(), ["js/b.js", "js/*.js"]).unwrap();
        assert_eq!(gather.predict(), vec!["js/b.js", "js/a.js"]);
    }

    #[test]
    fn test_empty_glob_contributes_nothing() {
        let temp = TempDir::new().unwrap();
        let gather = Gather::paths(temp.path(), ["nothing/*.css"]).unwrap();
        assert!(gather.predict().is_empty());
        assert!(gather.execute().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_glob_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let err = Gather::paths(temp.path(), ["css/[*.css"]).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
    }

    #[test]
    fn test_inline_inputs_bypass_filesystem() {
        let temp = TempDir::new().unwrap();
        let gather = Gather::new(
            temp.path(),
            vec![InputSpec::inline("generated/config.js", "var DEBUG = false;")],
            InputMode::Content,
        )
        .unwrap();

        let set = gather.execute().unwrap();
        assert_eq!(set.get("generated/config.js").unwrap().content(), b"var DEBUG = false;");
    }

    #[test]
    fn test_execute_reads_in_order() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "b.txt", "B");
        create_test_file(temp.path(), "a.txt", "A");

        let set = Gather::paths(temp.path(), ["b.txt", "a.txt"]).unwrap().execute().unwrap();
        assert_eq!(set.names(), vec!["b.txt", "a.txt"]);
        assert_eq!(set.concat(), b"BA");
    }

    #[test]
    fn test_refresh_picks_up_new_files() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "css/a.css", "");
        let mut gather = Gather::paths(temp.path(), ["css/*.css"]).unwrap();
        assert_eq!(gather.inputs().len(), 1);

        create_test_file(temp.path(), "css/b.css", "");
        assert_eq!(gather.inputs().len(), 1);
        gather.refresh().unwrap();
        assert_eq!(gather.inputs().len(), 2);
    }

    #[test]
    fn test_fingerprint_depends_on_specs_and_mode() {
        let temp = TempDir::new().unwrap();
        let a = Gather::paths(temp.path(), ["a.css"]).unwrap();
        let b = Gather::paths(temp.path(), ["b.css"]).unwrap();
        let c = Gather::new(temp.path(), vec!["a.css".into()], InputMode::Content).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_watch_dirs_and_matches() {
        let temp = TempDir::new().unwrap();
        let gather = Gather::paths(temp.path(), ["static/scss/**/*.scss", "vendor/reset.css"])
            .unwrap();

        let dirs = gather.watch_dirs();
        assert!(dirs.contains(&temp.path().join("static/scss")));
        assert!(dirs.contains(&temp.path().join("vendor")));

        assert!(gather.matches(&temp.path().join("static/scss/parts/_grid.scss")));
        assert!(gather.matches(&temp.path().join("vendor/reset.css")));
        assert!(!gather.matches(&temp.path().join("vendor/other.css")));
    }
}
