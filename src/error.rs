//! Error taxonomy for pipeline construction and runs.
//!
//! Every variant is fatal to the `run()` that produced it. There is no
//! stage-local recovery and no retry; the orchestrator unwinds on the first
//! error and nothing reaches storage.

use std::path::PathBuf;

use crate::clock::ClockError;
use crate::storage::StorageError;

/// Error raised while building or running a pipeline.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// A required tool path or setting is missing or unusable.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A declared input could not be read.
    #[error("cannot read input {path:?}: {source}")]
    InputResolution { path: PathBuf, source: std::io::Error },

    /// An external tool failed, timed out or wrote disallowed diagnostics.
    #[error("tool '{tool}' failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// A stage or storage name that was never registered.
    #[error("unknown stage kind '{kind}' (registered: {})", .available.join(", "))]
    UnknownStageKind { kind: String, available: Vec<String> },

    /// A stage produced different names than it predicted.
    #[error(
        "stage '{stage}' produced {produced:?} but predicted {predicted:?}; URLs would be wrong"
    )]
    PredictionMismatch { stage: String, predicted: Vec<String>, produced: Vec<String> },

    /// The storage collaborator failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The last-run clock store failed.
    #[error(transparent)]
    Clock(#[from] ClockError),
}

/// Convenience alias used throughout the pipeline modules.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a configuration error from any displayable message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a tool error for the named tool.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalTool { tool: tool.into(), message: message.into() }
    }

    /// Wrap an I/O failure on a declared input.
    pub fn input(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::InputResolution { path: path.into(), source }
    }
}
