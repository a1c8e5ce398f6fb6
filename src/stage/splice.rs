//! Splice literal files before or after the artifact set.
//!
//! Each spliced file becomes its own artifact, named by its path, so a
//! following `Bundle` places its content at the start or end of the bundle.

use crate::artifact::ArtifactSet;
use crate::error::Result;
use crate::fingerprint::StageFingerprint;

use super::{ensure_unique, push_unique, InputSource, StageContext, Transform};

/// Where spliced files go relative to the incoming set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplicePosition {
    /// Ahead of the incoming artifacts.
    Before,
    /// After the incoming artifacts.
    After,
}

/// Adds external files to the set without touching existing artifacts.
#[derive(Debug, Clone)]
pub struct Splice {
    files: Vec<String>,
    position: SplicePosition,
}

impl Splice {
    /// Files placed before the set.
    pub fn prepend<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { files: files.into_iter().map(Into::into).collect(), position: SplicePosition::Before }
    }

    /// Files placed after the set.
    pub fn append<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { files: files.into_iter().map(Into::into).collect(), position: SplicePosition::After }
    }

    /// Spliced file names, in order.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Splice position.
    pub fn position(&self) -> SplicePosition {
        self.position
    }

    fn stage_name(&self) -> &'static str {
        match self.position {
            SplicePosition::Before => "prepend",
            SplicePosition::After => "append",
        }
    }
}

impl Transform for Splice {
    fn kind(&self) -> &str {
        self.stage_name()
    }

    fn fingerprint(&self) -> String {
        let kind = match self.position {
            SplicePosition::Before => "Prepend",
            SplicePosition::After => "Append",
        };
        StageFingerprint::new(kind).args(&self.files).finish()
    }

    fn predict(&self, _ctx: &StageContext<'_>, names: Vec<String>) -> Result<Vec<String>> {
        let spliced = self.files.iter().cloned();
        let combined: Vec<String> = match self.position {
            SplicePosition::Before => spliced.chain(names).collect(),
            SplicePosition::After => names.into_iter().chain(spliced).collect(),
        };
        ensure_unique(combined, self.stage_name())
    }

    fn execute(&self, ctx: &StageContext<'_>, artifacts: ArtifactSet) -> Result<ArtifactSet> {
        let mut spliced = Vec::with_capacity(self.files.len());
        for file in &self.files {
            spliced.push(InputSource::file(file.clone()).read(ctx.root)?);
        }

        let mut out = ArtifactSet::new();
        let stage = self.stage_name();
        match self.position {
            SplicePosition::Before => {
                for artifact in spliced.into_iter().chain(artifacts) {
                    push_unique(&mut out, artifact, stage)?;
                }
            }
            SplicePosition::After => {
                for artifact in artifacts.into_iter().chain(spliced) {
                    push_unique(&mut out, artifact, stage)?;
                }
            }
        }
        Ok(out)
    }

    fn extra_inputs(&self) -> Vec<InputSource> {
        self.files.iter().map(|f| InputSource::file(f.clone())).collect()
    }
}
