//! Query command implementations (status, urls, resolve)

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use super::{fail, Project, EXIT_SUCCESS};
use crate::build::{AssetCatalog, CatalogError, UrlManifest};
use crate::serve::AssetServer;

/// Run the status command
pub fn run_status(project: &Project) -> ExitCode {
    let environment = match project.environment() {
        Ok(env) => env,
        Err(e) => return fail(e),
    };

    println!("Environment: {} ({})", environment.name(), if environment.is_live() { "live" } else { "precomputed" });
    for pipeline in environment.pipelines() {
        let state = match pipeline.is_dirty() {
            Ok(true) => "dirty".to_string(),
            Ok(false) => "clean".to_string(),
            Err(e) => format!("error: {}", e),
        };
        println!("  {:<20} {}", pipeline.name(), state);
        if let Ok(urls) = pipeline.output_urls() {
            for url in urls {
                println!("      {}", url);
            }
        }
    }
    ExitCode::from(EXIT_SUCCESS)
}

/// Run the urls command
pub fn run_urls(project: &Project, pipeline: Option<&str>, precomputed: bool) -> ExitCode {
    let environment = match project.environment() {
        Ok(env) => env,
        Err(e) => return fail(e),
    };
    let names: Vec<String> = match pipeline {
        Some(name) => vec![name.to_string()],
        None => environment.pipeline_names().into_iter().map(str::to_string).collect(),
    };

    let manifest_path = project.manifest_path(environment.name());
    let catalog = if precomputed {
        UrlManifest::load(&manifest_path).map(AssetCatalog::Precomputed).map_err(CatalogError::from)
    } else {
        AssetCatalog::for_environment(environment, |_| UrlManifest::load(&manifest_path))
    };
    let mut catalog = match catalog {
        Ok(catalog) => catalog,
        Err(e) => return fail(e),
    };

    for name in &names {
        match catalog.output_urls(name) {
            Ok(urls) => {
                for url in urls {
                    println!("{}", url);
                }
            }
            Err(e) => return fail(e),
        }
    }
    ExitCode::from(EXIT_SUCCESS)
}

/// Run the resolve command
pub fn run_resolve(project: &Project, path: &str, output: Option<&Path>) -> ExitCode {
    let environment = match project.environment() {
        Ok(env) => env,
        Err(e) => return fail(e),
    };

    let mut server = AssetServer::new(environment);
    let asset = match server.serve(path) {
        Ok(asset) => asset,
        Err(e) => return fail(e),
    };

    println!("{}\t{}\t{} bytes", asset.name, asset.content_type, asset.content.len());
    if let Some(output) = output {
        if let Err(e) = fs::write(output, &asset.content) {
            return fail(format!("cannot write {}: {}", output.display(), e));
        }
    }
    ExitCode::from(EXIT_SUCCESS)
}
