//! Pipeline stages.
//!
//! A pipeline is `Gather → Transform* → Output`. [`Gather`] is always the
//! root and [`Output`] always the tail; everything in between implements
//! [`Transform`], which has a two-phase contract:
//!
//! - [`Transform::predict`] maps the incoming name list to the outgoing one
//!   without touching content. It must be cheap: dirty checks and URL queries
//!   call it on every request.
//! - [`Transform::execute`] does the real work and must return exactly the
//!   names `predict` announced for the same input names.
//!
//! Stages never mutate the set they receive; they build and return a new one.

pub mod bundle;
pub mod gather;
pub mod hash_names;
pub mod output;
pub mod splice;
pub mod tool;
pub mod watch_gate;

pub use bundle::Bundle;
pub use gather::{Gather, InputSource, InputSpec};
pub use hash_names::HashNames;
pub use output::{CommitReport, Output, ServedAsset};
pub use splice::{Splice, SplicePosition};
pub use tool::{ToolScope, ToolStage};
pub use watch_gate::WatchGate;

use std::collections::HashSet;
use std::path::Path;
use std::time::SystemTime;

use crate::artifact::{Artifact, ArtifactSet};
use crate::error::{PipelineError, Result};
use crate::fingerprint::PipelineIdentity;

/// Read-only view of the pipeline handed to every stage call.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    /// Pipeline name, for logs and error messages
    pub pipeline: &'a str,
    /// Identity computed by the current prepare pass
    pub identity: &'a PipelineIdentity,
    /// Resolved inputs of the root stage
    pub inputs: &'a [InputSource],
    /// Base directory relative input names resolve against
    pub root: &'a Path,
    /// When the current run (or prepare) started
    pub started: SystemTime,
}

/// A processing step between `Gather` and `Output`.
pub trait Transform: std::fmt::Debug {
    /// Stage kind as registered, e.g. `"bundle"`.
    fn kind(&self) -> &str;

    /// Digest of kind and configuration; part of the pipeline identity.
    fn fingerprint(&self) -> String;

    /// Names this stage would emit for the given incoming names.
    fn predict(&self, ctx: &StageContext<'_>, names: Vec<String>) -> Result<Vec<String>>;

    /// Perform the transformation.
    fn execute(&self, ctx: &StageContext<'_>, artifacts: ArtifactSet) -> Result<ArtifactSet>;

    /// Stage-specific staleness, checked alongside the output presence check.
    fn is_dirty(&self, _ctx: &StageContext<'_>) -> Result<bool> {
        Ok(false)
    }

    /// Called once the run's artifacts are committed.
    fn on_commit(&mut self, _ctx: &StageContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Files read by the stage itself that must count towards the identity.
    fn extra_inputs(&self) -> Vec<InputSource> {
        Vec::new()
    }
}

/// Append `artifact`, turning a name clash into a configuration error.
pub(crate) fn push_unique(set: &mut ArtifactSet, artifact: Artifact, stage: &str) -> Result<()> {
    set.insert(artifact).map_err(|clash| {
        PipelineError::configuration(format!(
            "stage '{}' would emit '{}' twice; artifact names must be unique",
            stage,
            clash.name()
        ))
    })
}

/// Check a predicted name list for clashes, with the same error `push_unique` gives.
pub(crate) fn ensure_unique(names: Vec<String>, stage: &str) -> Result<Vec<String>> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in &names {
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::configuration(format!(
                "stage '{}' would emit '{}' twice; artifact names must be unique",
                stage, name
            )));
        }
    }
    Ok(names)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::fingerprint::PipelineIdentity;
    use std::path::PathBuf;

    /// Owns everything a [`StageContext`] borrows.
    pub struct ContextFixture {
        pub identity: PipelineIdentity,
        pub inputs: Vec<InputSource>,
        pub root: PathBuf,
    }

    impl ContextFixture {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self {
                identity: PipelineIdentity::new("structure".to_string(), "inputs".to_string()),
                inputs: Vec::new(),
                root: root.into(),
            }
        }

        pub fn ctx(&self) -> StageContext<'_> {
            StageContext {
                pipeline: "test",
                identity: &self.identity,
                inputs: &self.inputs,
                root: &self.root,
                started: SystemTime::now(),
            }
        }
    }

    pub fn set_of(entries: &[(&str, &str)]) -> ArtifactSet {
        let mut set = ArtifactSet::new();
        for (name, content) in entries {
            set.insert(Artifact::new(*name, content.as_bytes())).unwrap();
        }
        set
    }
}
