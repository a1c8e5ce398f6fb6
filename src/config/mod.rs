//! Configuration module for the asset pipeline
//!
//! Provides types, discovery and parsing for `assetpipe.toml` project configuration.

pub mod loader;
pub mod schema;

pub use loader::{
    default_config, find_config, find_config_from, load_config, merge_cli_overrides,
    project_root, resolve_path, CliOverrides, ConfigError, CONFIG_FILE,
};
pub use schema::*;
