//! Stage wrapping an external compile/minify tool.

use serde::{Deserialize, Serialize};

use crate::artifact::{extension_of, with_extension, Artifact, ArtifactSet};
use crate::error::Result;
use crate::fingerprint::StageFingerprint;
use crate::tool::ToolCommand;

use super::{ensure_unique, push_unique, StageContext, Transform};

/// How many artifacts one tool invocation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolScope {
    /// One invocation per in-domain artifact.
    #[default]
    PerArtifact,
    /// One invocation for every in-domain artifact together; the output takes
    /// the first in-domain artifact's name and position.
    WholeSet,
}

impl std::fmt::Display for ToolScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolScope::PerArtifact => write!(f, "per-artifact"),
            ToolScope::WholeSet => write!(f, "whole-set"),
        }
    }
}

/// Runs a [`ToolCommand`] over the artifacts whose extension is in its domain.
///
/// Artifacts outside the domain pass through untouched, in place.
#[derive(Debug, Clone)]
pub struct ToolStage {
    kind: String,
    command: ToolCommand,
    extensions: Vec<String>,
    output_extension: Option<String>,
    scope: ToolScope,
}

impl ToolStage {
    /// Create a stage of `kind` running `command`. With no extensions set the
    /// domain is every artifact.
    pub fn new(kind: impl Into<String>, command: ToolCommand) -> Self {
        Self {
            kind: kind.into(),
            command,
            extensions: Vec::new(),
            output_extension: None,
            scope: ToolScope::PerArtifact,
        }
    }

    /// Restrict the domain to these extensions (without the dot).
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| {
                let e: String = e.into();
                e.trim_start_matches('.').to_string()
            })
            .collect();
        self
    }

    /// Rename processed artifacts to this extension.
    pub fn with_output_extension(mut self, ext: impl Into<String>) -> Self {
        let ext: String = ext.into();
        self.output_extension = Some(ext.trim_start_matches('.').to_string());
        self
    }

    /// Set the invocation scope.
    pub fn with_scope(mut self, scope: ToolScope) -> Self {
        self.scope = scope;
        self
    }

    /// The wrapped command.
    pub fn command(&self) -> &ToolCommand {
        &self.command
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn scope(&self) -> ToolScope {
        self.scope
    }

    fn in_domain(&self, name: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        match extension_of(name) {
            Some(ext) => self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }

    fn output_name(&self, name: &str) -> String {
        match &self.output_extension {
            Some(ext) => with_extension(name, ext),
            None => name.to_string(),
        }
    }
}

impl Transform for ToolStage {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn fingerprint(&self) -> String {
        StageFingerprint::new(&self.kind)
            .arg(self.command.program().unwrap_or(""))
            .args(self.command.args())
            .option("extensions", self.extensions.join(","))
            .option("output_extension", self.output_extension.as_deref().unwrap_or(""))
            .option("input", format!("{:?}", self.command.input_channel()))
            .option("scope", self.scope)
            .finish()
    }

    fn predict(&self, _ctx: &StageContext<'_>, names: Vec<String>) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(names.len());
        let mut collapsed = false;
        for name in names {
            if !self.in_domain(&name) {
                out.push(name);
                continue;
            }
            match self.scope {
                ToolScope::PerArtifact => out.push(self.output_name(&name)),
                ToolScope::WholeSet if !collapsed => {
                    out.push(self.output_name(&name));
                    collapsed = true;
                }
                ToolScope::WholeSet => {}
            }
        }
        ensure_unique(out, &self.kind)
    }

    fn execute(&self, ctx: &StageContext<'_>, artifacts: ArtifactSet) -> Result<ArtifactSet> {
        let mut out = ArtifactSet::new();
        match self.scope {
            ToolScope::PerArtifact => {
                for artifact in artifacts {
                    if !self.in_domain(artifact.name()) {
                        push_unique(&mut out, artifact, &self.kind)?;
                        continue;
                    }
                    let content = self.command.run(ctx.root, &[&artifact])?;
                    let name = self.output_name(artifact.name());
                    push_unique(&mut out, Artifact::new(name, content), &self.kind)?;
                }
            }
            ToolScope::WholeSet => {
                if !artifacts.iter().any(|a| self.in_domain(a.name())) {
                    return Ok(artifacts);
                }
                let group: Vec<&Artifact> = artifacts.iter().filter(|a| self.in_domain(a.name())).collect();
                let first_name = group[0].name().to_string();
                let content = self.command.run(ctx.root, &group)?;
                let mut combined = Some(Artifact::new(self.output_name(&first_name), content));

                for artifact in artifacts.iter() {
                    if !self.in_domain(artifact.name()) {
                        push_unique(&mut out, artifact.clone(), &self.kind)?;
                    } else if let Some(built) = combined.take() {
                        push_unique(&mut out, built, &self.kind)?;
                    }
                }
            }
        }
        Ok(out)
    }
}
