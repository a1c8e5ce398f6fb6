//! Named deployment environments built from configuration.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{resolve_path, AssetConfig, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use crate::registry::{StageArgs, StageRegistry, StorageArgs};
use crate::stage::{Gather, InputSpec, Output};

/// The pipelines of one environment plus its serving mode.
///
/// A live environment may run pipelines when URLs or assets are requested.
/// A precomputed one answers URL queries from the manifest written by
/// `assetpipe build`.
#[derive(Debug)]
pub struct Environment {
    name: String,
    live: bool,
    pipelines: Vec<Pipeline>,
}

impl Environment {
    /// An empty environment.
    pub fn new(name: impl Into<String>, live: bool) -> Self {
        Self { name: name.into(), live, pipelines: Vec::new() }
    }

    /// Add a pipeline, keeping declaration order.
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    /// Build the environment `name` from configuration.
    ///
    /// `project_dir` is the directory holding `assetpipe.toml`; relative
    /// paths in the configuration resolve against it.
    pub fn from_config(
        config: &AssetConfig,
        name: &str,
        project_dir: &Path,
        registry: &StageRegistry,
    ) -> Result<Self> {
        let (env_name, env) = config.environment(name).ok_or_else(|| {
            let known: Vec<&str> = config.environments.keys().map(String::as_str).collect();
            PipelineError::configuration(format!(
                "unknown environment '{}' (configured: {})",
                name,
                known.join(", ")
            ))
        })?;

        let root = resolve_path(project_dir, &config.project.root);
        let clock_file = config.watch.clock_file.as_ref().map(|p| resolve_path(project_dir, p));

        let mut environment = Self::new(env_name, env.live);
        for (pipeline_name, pipeline) in &env.pipelines {
            let built = build_pipeline(
                config,
                pipeline_name,
                pipeline,
                &root,
                project_dir,
                clock_file.as_deref(),
                registry,
            )?;
            environment.pipelines.push(built);
        }

        debug!(environment = %env_name, live = env.live, pipelines = environment.pipelines.len(), "environment loaded");
        Ok(environment)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether queries may run pipelines.
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    pub fn pipelines_mut(&mut self) -> &mut [Pipeline] {
        &mut self.pipelines
    }

    /// Pipeline names in declaration order.
    pub fn pipeline_names(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name()).collect()
    }

    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.iter().find(|p| p.name() == name)
    }

    pub fn pipeline_mut(&mut self, name: &str) -> Option<&mut Pipeline> {
        self.pipelines.iter_mut().find(|p| p.name() == name)
    }
}

fn build_pipeline(
    config: &AssetConfig,
    name: &str,
    pipeline: &PipelineConfig,
    root: &Path,
    project_dir: &Path,
    clock_file: Option<&Path>,
    registry: &StageRegistry,
) -> Result<Pipeline> {
    let specs: Vec<InputSpec> = pipeline.inputs.iter().map(|s| InputSpec::path(s.clone())).collect();
    let gather = Gather::new(root.to_path_buf(), specs, pipeline.mode)?;

    let mut builder = Pipeline::builder(name, gather);
    for stage in &pipeline.stages {
        let args = StageArgs {
            pipeline: name,
            kind: &stage.kind,
            options: &stage.options,
            tools: &config.tools,
            root,
            clock_file,
        };
        builder = builder.then_boxed(registry.create_transform(&args)?);
    }

    let directory: Option<PathBuf> = pipeline.output.directory.as_ref().map(|d| resolve_path(project_dir, d));
    let storage = registry.create_storage(&StorageArgs {
        pipeline: name,
        kind: &pipeline.output.storage,
        directory: directory.as_deref(),
        read_only: pipeline.output.read_only,
    })?;

    let mut output = Output::new(storage).with_url_root(pipeline.output.url_root.clone());
    if let Some(prefix) = &pipeline.output.strip_prefix {
        output = output.with_strip_prefix(prefix.clone());
    }
    Ok(builder.output(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
[project]
name = "site"
root = "static"

[environments.dev]
live = true

[environments.dev.pipelines.css]
inputs = ["css/*.css"]
stages = [{ kind = "bundle", output = "site.css" }, { kind = "hash-names" }]
output = { storage = "filesystem", directory = "build", url_root = "/static/" }

[environments.dev.pipelines.js]
inputs = ["js/app.js"]
output = { storage = "memory" }

[environments.prod.pipelines.css]
inputs = ["css/*.css"]
stages = [{ kind = "less" }]
output = { storage = "memory" }
"#;

    fn project() -> (TempDir, AssetConfig) {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("static/css")).unwrap();
        fs::write(temp.path().join("static/css/a.css"), "a{}").unwrap();
        let config: AssetConfig = toml::from_str(CONFIG).unwrap();
        (temp, config)
    }

    #[test]
    fn test_from_config_builds_in_order() {
        let (temp, config) = project();
        let env = Environment::from_config(&config, "DEV", temp.path(), &StageRegistry::with_defaults()).unwrap();

        assert_eq!(env.name(), "dev");
        assert!(env.is_live());
        assert_eq!(env.pipeline_names(), vec!["css", "js"]);

        let css = env.pipeline("css").unwrap();
        assert_eq!(css.stage_kinds(), vec!["bundle", "hash-names"]);
        assert_eq!(css.root(), temp.path().join("static"));
        assert_eq!(css.url_root(), "/static/");
    }

    #[test]
    fn test_unknown_environment() {
        let (temp, config) = project();
        let err = Environment::from_config(&config, "staging", temp.path(), &StageRegistry::with_defaults())
            .unwrap_err();
        assert!(err.to_string().contains("staging"));
    }

    #[test]
    fn test_unknown_stage_kind_fails_construction() {
        let (temp, config) = project();
        let err =
            Environment::from_config(&config, "prod", temp.path(), &StageRegistry::with_defaults()).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownStageKind { .. }));
    }
}
