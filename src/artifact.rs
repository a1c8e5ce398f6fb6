//! Named content payloads threaded through a pipeline.
//!
//! An [`ArtifactSet`] is an insertion-ordered map from name to [`Artifact`].
//! Order matters: concatenating stages emit content in set order. Content is
//! reference counted, so pass-through stages hand artifacts downstream without
//! copying and no stage can mutate content it did not produce.

use indexmap::IndexMap;
use std::sync::Arc;

/// A logical name plus immutable content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    name: String,
    content: Arc<[u8]>,
}

impl Artifact {
    /// Create an artifact from owned bytes.
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), content: Arc::from(content.into()) }
    }

    /// The artifact's name, usually a `/`-separated relative path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw content.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Content length in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the content is empty.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Same content under a different name. The bytes are shared, not copied.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self { name: name.into(), content: Arc::clone(&self.content) }
    }

    /// File extension of the name, without the dot.
    pub fn extension(&self) -> Option<&str> {
        extension_of(&self.name)
    }
}

/// Ordered mapping of unique names to artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    entries: IndexMap<String, Artifact>,
}

impl ArtifactSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an artifact at the end of the set.
    ///
    /// Returns the artifact back if its name is already taken; names are unique
    /// and an existing entry is never replaced.
    pub fn insert(&mut self, artifact: Artifact) -> Result<(), Artifact> {
        if self.entries.contains_key(artifact.name()) {
            return Err(artifact);
        }
        self.entries.insert(artifact.name().to_string(), artifact);
        Ok(())
    }

    /// Look up an artifact by name.
    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.entries.get(name)
    }

    /// Whether a name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names in set order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Iterate artifacts in set order.
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.values()
    }

    /// Number of artifacts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Concatenate all contents in set order.
    pub fn concat(&self) -> Vec<u8> {
        let total = self.entries.values().map(Artifact::len).sum();
        let mut out = Vec::with_capacity(total);
        for artifact in self.entries.values() {
            out.extend_from_slice(artifact.content());
        }
        out
    }
}

impl IntoIterator for ArtifactSet {
    type Item = Artifact;
    type IntoIter = indexmap::map::IntoValues<String, Artifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

/// Extension of a `/`-separated name, ignoring dots in directory components.
pub fn extension_of(name: &str) -> Option<&str> {
    let file = name.rsplit('/').next().unwrap_or(name);
    match file.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&file[idx + 1..]),
    }
}

/// Replace (or add) the extension of a `/`-separated name.
pub fn with_extension(name: &str, ext: &str) -> String {
    let file_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    let stem_end = match name[file_start..].rfind('.') {
        Some(0) | None => name.len(),
        Some(idx) => file_start + idx,
    };
    format!("{}.{}", &name[..stem_end], ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_preserves_order() {
        let mut set = ArtifactSet::new();
        set.insert(Artifact::new("b.css", "b")).unwrap();
        set.insert(Artifact::new("a.css", "a")).unwrap();
        assert_eq!(set.names(), vec!["b.css", "a.css"]);
        assert_eq!(set.concat(), b"ba");
    }

    #[test]
    fn test_insert_rejects_duplicate_name() {
        let mut set = ArtifactSet::new();
        set.insert(Artifact::new("a.css", "first")).unwrap();
        let rejected = set.insert(Artifact::new("a.css", "second")).unwrap_err();
        assert_eq!(rejected.content(), b"second");
        assert_eq!(set.get("a.css").unwrap().content(), b"first");
    }

    #[test]
    fn test_renamed_shares_content() {
        let original = Artifact::new("a.js", "x = 1;");
        let renamed = original.renamed("a.min.js");
        assert_eq!(renamed.name(), "a.min.js");
        assert_eq!(renamed.content(), original.content());
        assert_eq!(original.name(), "a.js");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("static/css/site.css"), Some("css"));
        assert_eq!(extension_of("static.v2/readme"), None);
        assert_eq!(extension_of("static/.hidden"), None);
        assert_eq!(extension_of("a.b.c.js"), Some("js"));
    }

    #[test]
    fn test_with_extension() {
        assert_eq!(with_extension("scss/site.scss", "css"), "scss/site.css");
        assert_eq!(with_extension("dir.v1/noext", "css"), "dir.v1/noext.css");
        assert_eq!(with_extension("a.min.js", "map"), "a.min.map");
    }
}
