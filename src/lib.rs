//! assetpipe - Declarative static asset pipelines
//!
//! This library provides functionality to:
//! - Chain gather, transform and output stages into pipelines
//! - Skip runs whose inputs and configuration are unchanged
//! - Name outputs by fingerprint and map them to public URLs
//! - Serve stored outputs for fingerprinted request paths

pub mod artifact;
pub mod build;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod pipeline;
pub mod registry;
pub mod serve;
pub mod stage;
pub mod storage;
pub mod tool;
pub mod watch;
