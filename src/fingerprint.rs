//! Pipeline identity hashing and fingerprinted file names.
//!
//! Two digests make up a pipeline's identity:
//!
//! - the **structure** hash, folded from each stage's [`StageFingerprint`]
//!   (kind name, positional arguments in order, options sorted by key), and
//! - the **input** hash from [`pipeline_input_hash`], computed over the sorted
//!   resolved inputs using either their modification times or their content.
//!
//! The combined [`PipelineIdentity::fingerprint`] is what `HashNames` splices
//! into output names, so any change to configuration or inputs renames every
//! output at once.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::stage::gather::InputSource;

/// Number of hex characters kept in a name fingerprint.
pub const FINGERPRINT_LEN: usize = 16;

/// How resolved inputs contribute to the pipeline identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Hash modification times; cheap, a touch invalidates.
    #[default]
    Mtime,
    /// Hash raw content; edits invalidate, touches do not.
    Content,
}

impl std::fmt::Display for InputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputMode::Mtime => write!(f, "mtime"),
            InputMode::Content => write!(f, "content"),
        }
    }
}

/// Deterministic digest of one stage's kind and configuration.
///
/// Options are sorted by key before hashing, so call sites may add them in
/// any order.
#[derive(Debug, Clone)]
pub struct StageFingerprint {
    kind: String,
    args: Vec<String>,
    options: BTreeMap<String, String>,
}

impl StageFingerprint {
    /// Start a fingerprint for a stage kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), args: Vec::new(), options: BTreeMap::new() }
    }

    /// Add a positional argument.
    pub fn arg(mut self, value: impl Display) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// Add several positional arguments in order.
    pub fn args<I, T>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        self.args.extend(values.into_iter().map(|v| v.to_string()));
        self
    }

    /// Add a keyword option.
    pub fn option(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.options.insert(key.into(), value.to_string());
        self
    }

    /// Hex digest of kind, args and sorted options.
    pub fn finish(&self) -> String {
        let mut hasher = Sha256::new();
        update_part(&mut hasher, self.kind.as_bytes());
        for arg in &self.args {
            update_part(&mut hasher, arg.as_bytes());
        }
        for (key, value) in &self.options {
            update_part(&mut hasher, key.as_bytes());
            update_part(&mut hasher, value.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Parts are NUL-terminated so `("ab", "c")` and `("a", "bc")` differ.
fn update_part(hasher: &mut Sha256, part: &[u8]) {
    hasher.update(part);
    hasher.update([0u8]);
}

/// Digest over the sorted resolved inputs.
///
/// In [`InputMode::Mtime`] file inputs contribute their modification time and
/// in [`InputMode::Content`] their bytes. Inline inputs always contribute
/// their content. A file that cannot be stat'ed or read contributes a fixed
/// marker; the read failure itself surfaces later, at execute time.
pub fn pipeline_input_hash(inputs: &[InputSource], root: &Path, mode: InputMode) -> String {
    let mut sorted: Vec<&InputSource> = inputs.iter().collect();
    sorted.sort_by(|a, b| a.name().cmp(b.name()));

    let mut hasher = Sha256::new();
    update_part(&mut hasher, mode.to_string().as_bytes());
    for input in sorted {
        update_part(&mut hasher, input.name().as_bytes());
        match input {
            InputSource::Inline { content, .. } => update_part(&mut hasher, content),
            InputSource::File { .. } => {
                let path = input.resolve(root);
                match mode {
                    InputMode::Mtime => match modified_nanos(&path) {
                        Some(nanos) => update_part(&mut hasher, nanos.to_string().as_bytes()),
                        None => update_part(&mut hasher, b"<missing>"),
                    },
                    InputMode::Content => match fs::read(&path) {
                        Ok(bytes) => update_part(&mut hasher, &bytes),
                        Err(_) => update_part(&mut hasher, b"<missing>"),
                    },
                }
            }
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Modification time in nanoseconds since the epoch.
pub(crate) fn modified_nanos(path: &Path) -> Option<u128> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(modified.duration_since(UNIX_EPOCH).ok()?.as_nanos())
}

/// Identity of a pipeline as of one prepare pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineIdentity {
    /// Digest over ordered stage fingerprints.
    pub structure: String,
    /// Digest over resolved inputs.
    pub inputs: String,
    /// Short combined digest used in output names.
    pub fingerprint: String,
}

impl PipelineIdentity {
    /// Combine a structure hash and an input hash.
    pub fn new(structure: String, inputs: String) -> Self {
        let mut hasher = Sha256::new();
        update_part(&mut hasher, structure.as_bytes());
        update_part(&mut hasher, inputs.as_bytes());
        let mut fingerprint = format!("{:x}", hasher.finalize());
        fingerprint.truncate(FINGERPRINT_LEN);
        Self { structure, inputs, fingerprint }
    }
}

/// Fold ordered stage fingerprints into one structure hash.
pub fn structure_hash<'a>(stage_hashes: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for hash in stage_hashes {
        update_part(&mut hasher, hash.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Hex digest of arbitrary bytes.
pub fn digest_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Split a path into its directory part (with trailing `/`) and file name.
fn split_dir(name: &str) -> (&str, &str) {
    let file_start = name.rfind('/').map_or(0, |i| i + 1);
    name.split_at(file_start)
}

/// Split a file name into stem and extension (with its dot).
///
/// Leading dots belong to the stem, so `.hidden` has no extension and
/// `.hidden.css` splits as `.hidden` + `.css`.
fn split_ext(file: &str) -> (&str, &str) {
    let lead = file.len() - file.trim_start_matches('.').len();
    match file[lead..].rfind('.') {
        Some(i) => file.split_at(lead + i),
        None => (file, ""),
    }
}

fn is_fingerprint(segment: &str) -> bool {
    segment.len() == FINGERPRINT_LEN && segment.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Turn `dir/base.ext` into `dir/base.FINGERPRINT.ext`.
///
/// Names without an extension get the fingerprint appended: `dir/base.FP`.
pub fn add_fingerprint(name: &str, fingerprint: &str) -> String {
    let (dir, file) = split_dir(name);
    let (stem, ext) = split_ext(file);
    format!("{}{}.{}{}", dir, stem, fingerprint, ext)
}

/// Remove the fingerprint segment that [`add_fingerprint`] inserted.
///
/// `dir/base.FP.ext` becomes `dir/base.ext` whatever alphabet the fingerprint
/// uses. A name with a single dot is only treated as `base.FP` when its last
/// segment has the shape of one of our fingerprints, so `app.js` stays as is.
pub fn strip_fingerprint(name: &str) -> String {
    let (dir, file) = split_dir(name);
    let (stem, ext) = split_ext(file);
    let (base, segment) = split_ext(stem);
    if !segment.is_empty() {
        return format!("{}{}{}", dir, base, ext);
    }
    if ext.len() > 1 && is_fingerprint(&ext[1..]) {
        return format!("{}{}", dir, stem);
    }
    name.to_string()
}

/// The fingerprint segment of a stored name, if it has one.
///
/// Only a segment of exactly [`FINGERPRINT_LEN`] lowercase hex characters in
/// the position [`add_fingerprint`] uses counts, so `app.min.js` is never
/// mistaken for a variant of `app.js`.
pub fn fingerprint_segment(name: &str) -> Option<&str> {
    let (_, file) = split_dir(name);
    let (stem, ext) = split_ext(file);
    let (_, segment) = split_ext(stem);
    let candidate = if segment.is_empty() { ext } else { segment };
    let candidate = candidate.strip_prefix('.')?;
    is_fingerprint(candidate).then_some(candidate)
}

/// The unfingerprinted name used to match requests against stored keys.
///
/// Only real fingerprints are removed; other names are their own base.
pub fn base_name(name: &str) -> String {
    if fingerprint_segment(name).is_some() {
        strip_fingerprint(name)
    } else {
        name.to_string()
    }
}
