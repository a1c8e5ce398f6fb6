//! Content-addressed renaming.

use crate::artifact::ArtifactSet;
use crate::error::Result;
use crate::fingerprint::{add_fingerprint, StageFingerprint};

use super::{ensure_unique, push_unique, StageContext, Transform};

/// Renames `base.ext` to `base.FINGERPRINT.ext`.
///
/// The fingerprint is the pipeline identity, not a per-file digest, so any
/// change to inputs or stage configuration renames every output together.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashNames;

impl HashNames {
    pub fn new() -> Self {
        Self
    }
}

impl Transform for HashNames {
    fn kind(&self) -> &str {
        "hash-names"
    }

    fn fingerprint(&self) -> String {
        StageFingerprint::new("HashFileNames").finish()
    }

    fn predict(&self, ctx: &StageContext<'_>, names: Vec<String>) -> Result<Vec<String>> {
        let fp = &ctx.identity.fingerprint;
        ensure_unique(names.iter().map(|n| add_fingerprint(n, fp)).collect(), "hash-names")
    }

    fn execute(&self, ctx: &StageContext<'_>, artifacts: ArtifactSet) -> Result<ArtifactSet> {
        let fp = &ctx.identity.fingerprint;
        let mut out = ArtifactSet::new();
        for artifact in artifacts.iter() {
            push_unique(&mut out, artifact.renamed(add_fingerprint(artifact.name(), fp)), "hash-names")?;
        }
        Ok(out)
    }
}
