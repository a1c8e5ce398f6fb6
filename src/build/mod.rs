//! Environment-level build system
//!
//! Builds every pipeline of a configured environment, records the resulting
//! public URLs in a per-environment manifest and answers URL queries.
//!
//! # Example
//!
//! ```ignore
//! use assetpipe::build::{build_environment, manifest_path, Environment, UrlManifest};
//! use assetpipe::config::load_config;
//! use assetpipe::registry::StageRegistry;
//!
//! let config = load_config(None)?;
//! let mut env = Environment::from_config(&config, "prod", project_dir, &StageRegistry::with_defaults())?;
//!
//! let result = build_environment(&mut env, false);
//! UrlManifest::from_build(&result).save(&manifest_path(&config.manifest.path, env.name()))?;
//! println!("{}", result.summary());
//! ```

pub mod catalog;
pub mod environment;
pub mod manifest;
pub mod result;
pub mod runner;

pub use catalog::*;
pub use environment::*;
pub use manifest::*;
pub use result::*;
pub use runner::*;
