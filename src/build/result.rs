//! Build result types.
//!
//! Contains types for representing the outcome of building an environment.

use std::time::Duration;

/// Status of a single pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// Pipeline executed and committed
    Built,
    /// Pipeline was already current
    Clean,
    /// Pipeline failed with error
    Failed(String),
}

impl BuildStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Built | BuildStatus::Clean)
    }

    /// Check if the status indicates failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, BuildStatus::Failed(_))
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Built => write!(f, "built"),
            BuildStatus::Clean => write!(f, "clean"),
            BuildStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Result of running a single pipeline.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Pipeline name
    pub pipeline: String,
    /// Run status
    pub status: BuildStatus,
    /// Public URLs of the pipeline's outputs
    pub urls: Vec<String>,
    /// Storage keys written
    pub written: Vec<String>,
    /// Stale storage keys removed
    pub removed: Vec<String>,
    /// Run duration
    pub duration: Duration,
}

impl PipelineResult {
    /// Create a result for a pipeline that executed.
    pub fn built(pipeline: String, urls: Vec<String>, duration: Duration) -> Self {
        Self {
            pipeline,
            status: BuildStatus::Built,
            urls,
            written: vec![],
            removed: vec![],
            duration,
        }
    }

    /// Create a result for a pipeline that was already current.
    pub fn clean(pipeline: String, urls: Vec<String>, duration: Duration) -> Self {
        Self {
            pipeline,
            status: BuildStatus::Clean,
            urls,
            written: vec![],
            removed: vec![],
            duration,
        }
    }

    /// Create a failed result.
    pub fn failed(pipeline: String, error: String, duration: Duration) -> Self {
        Self {
            pipeline,
            status: BuildStatus::Failed(error),
            urls: vec![],
            written: vec![],
            removed: vec![],
            duration,
        }
    }

    /// Record the storage changes of the commit.
    pub fn with_changes(mut self, written: Vec<String>, removed: Vec<String>) -> Self {
        self.written = written;
        self.removed = removed;
        self
    }

    /// Check if this result is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Result of building every pipeline in an environment.
#[derive(Debug, Default)]
pub struct BuildResult {
    /// Results for each pipeline, in declaration order
    pub pipelines: Vec<PipelineResult>,
    /// Total build duration
    pub total_duration: Duration,
}

impl BuildResult {
    /// Create a new empty build result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pipeline result.
    pub fn add_result(&mut self, result: PipelineResult) {
        self.pipelines.push(result);
    }

    /// Set the total duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    /// Get the number of pipelines that executed.
    pub fn built_count(&self) -> usize {
        self.pipelines.iter().filter(|r| matches!(r.status, BuildStatus::Built)).count()
    }

    /// Get the number of pipelines that were already current.
    pub fn clean_count(&self) -> usize {
        self.pipelines.iter().filter(|r| matches!(r.status, BuildStatus::Clean)).count()
    }

    /// Get the number of failed pipelines.
    pub fn failed_count(&self) -> usize {
        self.pipelines.iter().filter(|r| r.status.is_failure()).count()
    }

    /// Check if the overall build succeeded (no failures).
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Get failed pipeline results.
    pub fn failures(&self) -> Vec<&PipelineResult> {
        self.pipelines.iter().filter(|r| r.status.is_failure()).collect()
    }

    /// Format a summary of the build result.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let built = self.built_count();
        let clean = self.clean_count();
        let failed = self.failed_count();
        let total = self.pipelines.len();

        if failed > 0 {
            lines.push(format!(
                "Build failed: {} built, {} clean, {} failed ({} total)",
                built, clean, failed, total
            ));
            for pipeline in self.failures() {
                lines.push(format!("  - {}: {}", pipeline.pipeline, pipeline.status));
            }
        } else {
            lines.push(format!(
                "Build succeeded: {} built, {} clean ({} total) in {:?}",
                built, clean, total, self.total_duration
            ));
        }

        lines.join("\n")
    }
}
