//! Configuration schema types for `assetpipe.toml`
//!
//! Defines the structure and validation rules for asset pipeline projects.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::fingerprint::InputMode;

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (required)
    pub name: String,
    /// Base directory that pipeline inputs are relative to
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Environment used when none is given on the command line
    #[serde(default = "default_active")]
    pub active: String,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_active() -> String {
    "dev".to_string()
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Sass compiler executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sass: Option<String>,
    /// Java VM used for the jar-based tools
    #[serde(default = "default_java")]
    pub java: String,
    /// Python interpreter used for Closure Builder
    #[serde(default = "default_python")]
    pub python: String,
    /// Path to the YUI Compressor jar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yui_compressor: Option<PathBuf>,
    /// Path to the Closure Compiler jar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure_compiler: Option<PathBuf>,
    /// Path to closurebuilder.py
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure_builder: Option<PathBuf>,
    /// Extra Sass load paths
    #[serde(default)]
    pub sass_load_paths: Vec<PathBuf>,
    /// Per-invocation timeout; unset means wait indefinitely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_java() -> String {
    "java".to_string()
}

fn default_python() -> String {
    "python3".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            sass: None,
            java: default_java(),
            python: default_python(),
            yui_compressor: None,
            closure_compiler: None,
            closure_builder: None,
            sass_load_paths: Vec::new(),
            timeout_secs: None,
        }
    }
}

impl ToolsConfig {
    /// Timeout applied to every tool invocation.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// URL manifest settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Base manifest path; each environment gets `<stem>.<env>.<ext>`
    #[serde(default = "default_manifest_path")]
    pub path: PathBuf,
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("assets.json")
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self { path: default_manifest_path() }
    }
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default = "default_true")]
    pub clear_screen: bool,
    /// File used to persist last-run times of `watch` stages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_file: Option<PathBuf>,
}

fn default_debounce_ms() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100, clear_screen: true, clock_file: None }
    }
}

/// One stage entry: a registered kind plus its options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Registered stage kind, e.g. `"sass"` or `"bundle"`
    pub kind: String,
    /// Remaining keys, interpreted by the stage constructor
    #[serde(flatten)]
    pub options: toml::Table,
}

/// Terminal stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Registered storage kind
    #[serde(default = "default_storage")]
    pub storage: String,
    /// Storage root directory for filesystem storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Public URL prefix of stored artifacts
    #[serde(default = "default_url_root")]
    pub url_root: String,
    /// Leading name segment removed before storing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_prefix: Option<String>,
    /// Reject writes to storage
    #[serde(default)]
    pub read_only: bool,
}

fn default_storage() -> String {
    "filesystem".to_string()
}

fn default_url_root() -> String {
    "/static/".to_string()
}

/// One pipeline: inputs, ordered stages and output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Literal paths or glob patterns, relative to `project.root`
    pub inputs: Vec<String>,
    /// Input invalidation mode
    #[serde(default)]
    pub mode: InputMode,
    /// Transform stages, in execution order
    #[serde(default)]
    pub stages: Vec<StageConfig>,
    /// Terminal stage
    pub output: OutputConfig,
}

/// A named deployment environment
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvironmentConfig {
    /// Whether URL queries may run pipelines (true) or read the manifest (false)
    #[serde(default)]
    pub live: bool,
    /// Pipelines, in declaration order
    #[serde(default)]
    pub pipelines: IndexMap<String, PipelineConfig>,
}

/// Complete assetpipe.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Project metadata (required)
    pub project: ProjectConfig,
    /// Tool locations
    #[serde(default)]
    pub tools: ToolsConfig,
    /// URL manifest settings
    #[serde(default)]
    pub manifest: ManifestConfig,
    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,
    /// Deployment environments
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "environments.dev.pipelines.css.inputs")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "assetpipe.toml: '{}' {}", self.field, self.message)
    }
}

impl AssetConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: String, message: &str| {
            errors.push(ConfigValidationError { field, message: message.to_string() });
        };

        if self.project.name.is_empty() {
            push("project.name".to_string(), "must be a non-empty string");
        }

        if !self.environments.is_empty() && self.environment(&self.project.active).is_none() {
            push("project.active".to_string(), "must name a configured environment");
        }

        if self.watch.debounce_ms == 0 {
            push("watch.debounce_ms".to_string(), "must be a positive integer");
        }

        if self.tools.timeout_secs == Some(0) {
            push("tools.timeout_secs".to_string(), "must be a positive integer");
        }

        for (env_name, env) in &self.environments {
            for (name, pipeline) in &env.pipelines {
                let prefix = format!("environments.{}.pipelines.{}", env_name, name);

                if pipeline.inputs.is_empty() {
                    push(format!("{}.inputs", prefix), "must contain at least one path or glob");
                }

                for (i, stage) in pipeline.stages.iter().enumerate() {
                    if stage.kind.trim().is_empty() {
                        push(format!("{}.stages[{}].kind", prefix, i), "must be a non-empty string");
                    }
                }

                let output = &pipeline.output;
                if output.storage == "filesystem" && output.directory.is_none() {
                    push(format!("{}.output.directory", prefix), "is required for filesystem storage");
                }
                if !output.url_root.starts_with('/') && !output.url_root.contains("://") {
                    push(format!("{}.output.url_root", prefix), "must start with '/' or be an absolute URL");
                }
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Look up an environment by name, ignoring case.
    pub fn environment(&self, name: &str) -> Option<(&str, &EnvironmentConfig)> {
        self.environments
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(key, env)| (key.as_str(), env))
    }
}
