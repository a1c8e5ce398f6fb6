//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod query;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::build::{manifest_path, Environment};
use crate::config::{find_config, load_config, merge_cli_overrides, resolve_path, AssetConfig, CliOverrides};
use crate::registry::StageRegistry;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;

/// assetpipe - Build, fingerprint and serve static assets
#[derive(Parser)]
#[command(name = "assetpipe")]
#[command(about = "assetpipe - Build, fingerprint and serve static assets")]
#[command(version)]
pub struct Cli {
    /// Path to assetpipe.toml (default: search upwards from the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Environment to operate on (default: project.active)
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    /// Per-invocation tool timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every pipeline of the environment and write its URL manifest
    Build {
        /// Run pipelines even when they are clean
        #[arg(long)]
        force: bool,

        /// Stop at the first failing pipeline
        #[arg(long)]
        fail_fast: bool,

        /// Do not write the URL manifest
        #[arg(long)]
        no_manifest: bool,

        /// Only build these pipelines
        pipelines: Vec<String>,
    },

    /// Show which pipelines are dirty, without running anything
    Status,

    /// Print the public URLs of one or all pipelines
    Urls {
        /// Pipeline to query (default: all)
        pipeline: Option<String>,

        /// Read the manifest even if the environment is live
        #[arg(long)]
        precomputed: bool,
    },

    /// Resolve a request path to a stored artifact
    Resolve {
        /// Request path, e.g. /static/site.0123456789abcdef.css
        path: String,

        /// Write the artifact content to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rebuild affected pipelines whenever their inputs change
    Watch {
        /// Do not keep the URL manifest current
        #[arg(long)]
        no_manifest: bool,
    },
}

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "assetpipe=warn",
        1 => "assetpipe=info",
        2 => "assetpipe=debug",
        _ => "assetpipe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).with_writer(std::io::stderr).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).with_writer(std::io::stderr).init();
        }
    }
}

/// A loaded project: configuration plus the directory holding it.
pub(crate) struct Project {
    pub config: AssetConfig,
    pub dir: PathBuf,
}

impl Project {
    /// Load `assetpipe.toml` and apply the global overrides.
    pub fn load(cli: &Cli) -> Result<Self, String> {
        let config_path = match &cli.config {
            Some(path) => path.clone(),
            None => find_config().ok_or_else(|| {
                "no assetpipe.toml found in this directory or any parent".to_string()
            })?,
        };

        let mut config = load_config(Some(&config_path)).map_err(|e| e.to_string())?;
        let overrides = CliOverrides { env: cli.env.clone(), timeout_secs: cli.timeout, ..Default::default() };
        merge_cli_overrides(&mut config, &overrides);

        let dir = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self { config, dir })
    }

    /// Build the active environment.
    pub fn environment(&self) -> Result<Environment, String> {
        Environment::from_config(&self.config, &self.config.project.active, &self.dir, &StageRegistry::with_defaults())
            .map_err(|e| e.to_string())
    }

    /// Manifest file of an environment.
    pub fn manifest_path(&self, environment: &str) -> PathBuf {
        resolve_path(&self.dir, &manifest_path(&self.config.manifest.path, environment))
    }
}

/// Print an error and return the error exit code.
pub(crate) fn fail(message: impl std::fmt::Display) -> ExitCode {
    eprintln!("Error: {}", message);
    ExitCode::from(EXIT_ERROR)
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let project = match Project::load(&cli) {
        Ok(project) => project,
        Err(e) => return fail(e),
    };

    match &cli.command {
        Commands::Build { force, fail_fast, no_manifest, pipelines } => {
            build::run_build(&project, *force, *fail_fast, *no_manifest, pipelines)
        }
        Commands::Status => query::run_status(&project),
        Commands::Urls { pipeline, precomputed } => query::run_urls(&project, pipeline.as_deref(), *precomputed),
        Commands::Resolve { path, output } => query::run_resolve(&project, path, output.as_deref()),
        Commands::Watch { no_manifest } => build::run_watch(&project, *no_manifest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["assetpipe", "build", "--force", "-vv", "--env", "prod", "css"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.env.as_deref(), Some("prod"));
        match cli.command {
            Commands::Build { force, pipelines, .. } => {
                assert!(force);
                assert_eq!(pipelines, vec!["css"]);
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_log_format_values() {
        let cli = Cli::try_parse_from(["assetpipe", "--log-format", "json", "status"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(Cli::try_parse_from(["assetpipe", "--log-format", "xml", "status"]).is_err());
    }
}
