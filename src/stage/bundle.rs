//! Concatenate the whole set into one artifact.

use crate::artifact::{Artifact, ArtifactSet};
use crate::error::Result;
use crate::fingerprint::StageFingerprint;

use super::{StageContext, Transform};

/// Collapses every incoming artifact into `output`, in set order.
///
/// An empty incoming set still yields `output`, with empty content, so the
/// predicted name list never depends on content.
#[derive(Debug, Clone)]
pub struct Bundle {
    output: String,
}

impl Bundle {
    /// Create a bundle stage writing to `output`.
    pub fn new(output: impl Into<String>) -> Self {
        Self { output: output.into() }
    }

    /// The fixed output name.
    pub fn output(&self) -> &str {
        &self.output
    }
}

impl Transform for Bundle {
    fn kind(&self) -> &str {
        "bundle"
    }

    fn fingerprint(&self) -> String {
        StageFingerprint::new("Bundle").arg(&self.output).finish()
    }

    fn predict(&self, _ctx: &StageContext<'_>, _names: Vec<String>) -> Result<Vec<String>> {
        Ok(vec![self.output.clone()])
    }

    fn execute(&self, _ctx: &StageContext<'_>, artifacts: ArtifactSet) -> Result<ArtifactSet> {
        let mut out = ArtifactSet::new();
        super::push_unique(&mut out, Artifact::new(self.output.clone(), artifacts.concat()), "bundle")?;
        Ok(out)
    }
}
