//! Build command implementations (build, watch)

use std::process::ExitCode;

use super::{fail, Project, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{AssetBuild, UrlManifest};
use crate::watch::{watch_environment, WatchOptions};

/// Run the build command
pub fn run_build(
    project: &Project,
    force: bool,
    fail_fast: bool,
    no_manifest: bool,
    pipelines: &[String],
) -> ExitCode {
    let mut environment = match project.environment() {
        Ok(env) => env,
        Err(e) => return fail(e),
    };

    if let Some(unknown) = pipelines.iter().find(|name| environment.pipeline(name).is_none()) {
        return fail(format!(
            "environment '{}' has no pipeline '{}' (configured: {})",
            environment.name(),
            unknown,
            environment.pipeline_names().join(", ")
        ));
    }

    if force {
        println!("Building '{}' (force)...", environment.name());
    } else {
        println!("Building '{}'...", environment.name());
    }

    let result = AssetBuild::new()
        .with_force(force)
        .with_fail_fast(fail_fast)
        .with_filter(pipelines.to_vec())
        .build(&mut environment);

    for pipeline in &result.pipelines {
        println!("  {:<20} {}", pipeline.pipeline, pipeline.status);
        for url in &pipeline.urls {
            println!("      {}", url);
        }
    }

    // A partial build would drop the other pipelines from the manifest.
    if !no_manifest && result.is_success() && pipelines.is_empty() {
        let path = project.manifest_path(environment.name());
        if let Err(e) = UrlManifest::from_build(&result).save(&path) {
            eprintln!("{}", result.summary());
            return fail(e);
        }
        println!("Wrote {}", path.display());
    }

    if result.is_success() {
        println!("{}", result.summary());
        ExitCode::from(EXIT_SUCCESS)
    } else {
        eprintln!("{}", result.summary());
        ExitCode::from(EXIT_ERROR)
    }
}

/// Run the watch command
pub fn run_watch(project: &Project, no_manifest: bool) -> ExitCode {
    let environment = match project.environment() {
        Ok(env) => env,
        Err(e) => return fail(e),
    };

    let options = WatchOptions {
        config: project.config.watch.clone(),
        manifest: (!no_manifest).then(|| project.manifest_path(environment.name())),
    };

    println!("Starting watch mode for '{}'...", environment.name());
    println!("Press Ctrl+C to stop");
    println!();

    match watch_environment(environment, options) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => fail(format!("watch error: {}", e)),
    }
}
