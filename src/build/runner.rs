//! Build-all orchestration.
//!
//! Runs every pipeline of an environment in declaration order and collects a
//! per-pipeline result. A failing pipeline does not stop the others unless
//! fail-fast is set; its own run is still all-or-nothing.

use std::time::Instant;
use tracing::{error, info};

use crate::build::{BuildResult, Environment, PipelineResult};
use crate::pipeline::{Pipeline, RunOutcome};

/// Runs the pipelines of an [`Environment`].
#[derive(Debug, Clone, Default)]
pub struct AssetBuild {
    /// Run even when clean
    force: bool,
    /// Whether to stop on first error
    fail_fast: bool,
    /// Only run these pipelines
    filter: Option<Vec<String>>,
}

impl AssetBuild {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run pipelines even when they are clean.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set fail-fast mode (stop on first error).
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Restrict the build to the named pipelines.
    pub fn with_filter(mut self, pipelines: Vec<String>) -> Self {
        self.filter = if pipelines.is_empty() { None } else { Some(pipelines) };
        self
    }

    fn selected(&self, name: &str) -> bool {
        self.filter.as_ref().map_or(true, |names| names.iter().any(|n| n == name))
    }

    /// Run the selected pipelines.
    pub fn build(&self, environment: &mut Environment) -> BuildResult {
        let start = Instant::now();
        let mut result = BuildResult::new();

        for pipeline in environment.pipelines_mut() {
            if !self.selected(pipeline.name()) {
                continue;
            }
            let pipeline_result = self.run_pipeline(pipeline);
            let failed = pipeline_result.status.is_failure();
            result.add_result(pipeline_result);
            if failed && self.fail_fast {
                break;
            }
        }

        result.with_duration(start.elapsed())
    }

    fn run_pipeline(&self, pipeline: &mut Pipeline) -> PipelineResult {
        let start = Instant::now();
        let name = pipeline.name().to_string();

        let outcome = if self.force { pipeline.force_run() } else { pipeline.run() };
        let outcome = outcome.and_then(|outcome| pipeline.output_urls().map(|urls| (outcome, urls)));

        match outcome {
            Ok((RunOutcome::Built(report), urls)) => {
                info!(pipeline = %name, written = report.written.len(), removed = report.removed.len(), "pipeline built");
                PipelineResult::built(name, urls, start.elapsed()).with_changes(report.written, report.removed)
            }
            Ok((RunOutcome::Clean, urls)) => {
                info!(pipeline = %name, "pipeline clean");
                PipelineResult::clean(name, urls, start.elapsed())
            }
            Err(e) => {
                error!(pipeline = %name, error = %e, "pipeline failed");
                PipelineResult::failed(name, e.to_string(), start.elapsed())
            }
        }
    }
}

/// Run every pipeline of `environment`.
pub fn build_environment(environment: &mut Environment, force: bool) -> BuildResult {
    AssetBuild::new().with_force(force).build(environment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{Gather, Output};
    use crate::storage::MemoryStorage;
    use std::fs;
    use tempfile::TempDir;

    fn environment(temp: &TempDir) -> Environment {
        fs::write(temp.path().join("a.css"), "a{}").unwrap();
        let css = Pipeline::builder("css", Gather::paths(temp.path(), ["a.css"]).unwrap())
            .hash_names()
            .output(Output::new(Box::new(MemoryStorage::new())).with_url_root("/static/"));
        let broken = Pipeline::builder("broken", Gather::paths(temp.path(), ["missing.js"]).unwrap())
            .output(Output::new(Box::new(MemoryStorage::new())));
        let js = Pipeline::builder("js", Gather::paths(temp.path(), ["a.css"]).unwrap())
            .bundle("app.js")
            .output(Output::new(Box::new(MemoryStorage::new())));
        Environment::new("dev", true).with_pipeline(css).with_pipeline(broken).with_pipeline(js)
    }

    #[test]
    fn test_build_continues_past_failure() {
        let temp = TempDir::new().unwrap();
        let mut env = environment(&temp);

        let result = build_environment(&mut env, false);
        assert_eq!(result.built_count(), 2);
        assert_eq!(result.failed_count(), 1);
        assert_eq!(result.failures()[0].pipeline, "broken");

        let css = &result.pipelines[0];
        assert_eq!(css.urls.len(), 1);
        assert!(css.urls[0].starts_with("/static/a."));
    }

    #[test]
    fn test_second_build_is_clean() {
        let temp = TempDir::new().unwrap();
        let mut env = environment(&temp);
        let build = AssetBuild::new().with_filter(vec!["css".to_string(), "js".to_string()]);

        assert_eq!(build.build(&mut env).built_count(), 2);
        let second = build.build(&mut env);
        assert_eq!(second.clean_count(), 2);
        assert!(second.is_success());
    }

    #[test]
    fn test_force_rebuilds_clean_pipelines() {
        let temp = TempDir::new().unwrap();
        let mut env = environment(&temp);
        let build = AssetBuild::new().with_filter(vec!["css".to_string()]);
        build.build(&mut env);

        let forced = build.with_force(true).build(&mut env);
        assert_eq!(forced.built_count(), 1);
        assert!(forced.pipelines[0].written.is_empty());
    }

    #[test]
    fn test_fail_fast_stops() {
        let temp = TempDir::new().unwrap();
        let mut env = environment(&temp);

        let result = AssetBuild::new().with_fail_fast(true).build(&mut env);
        assert_eq!(result.pipelines.len(), 2);
        assert!(!result.is_success());
    }
}
