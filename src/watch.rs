//! Watch mode for automatic rebuilds on file changes
//!
//! Provides file system watching with debouncing for the `assetpipe watch` command.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::build::{AssetBuild, BuildResult, Environment, UrlManifest};
use crate::config::schema::WatchConfig;

/// Error during watch mode
#[derive(Debug)]
pub enum WatchError {
    /// Failed to initialize file watcher
    WatcherInit(notify::Error),
    /// Failed to add watch path
    WatchPath(notify::Error),
    /// Channel receive error
    ChannelError(String),
    /// None of the environment's input directories exist
    NothingToWatch(String),
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchError::WatcherInit(e) => write!(f, "Failed to initialize file watcher: {}", e),
            WatchError::WatchPath(e) => write!(f, "Failed to watch path: {}", e),
            WatchError::ChannelError(msg) => write!(f, "Watch channel error: {}", msg),
            WatchError::NothingToWatch(env) => {
                write!(f, "Environment '{}' has no existing input directories to watch", env)
            }
        }
    }
}

impl std::error::Error for WatchError {}

/// Tracks failing pipelines across rebuilds for recovery detection
#[derive(Debug, Default)]
pub struct FailureTracker {
    failing: BTreeSet<String>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with a new build result, returns pipelines that recovered
    pub fn update(&mut self, result: &BuildResult) -> Vec<String> {
        let mut recovered = Vec::new();
        for pipeline in &result.pipelines {
            if pipeline.status.is_failure() {
                self.failing.insert(pipeline.pipeline.clone());
            } else if self.failing.remove(&pipeline.pipeline) {
                recovered.push(pipeline.pipeline.clone());
            }
        }
        recovered
    }

    pub fn has_failures(&self) -> bool {
        !self.failing.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.failing.len()
    }
}

/// Options for watch mode
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Watch configuration (debounce, clear screen)
    pub config: WatchConfig,
    /// Manifest to keep current after each rebuild
    pub manifest: Option<PathBuf>,
}

/// Clear the terminal screen
fn clear_screen() {
    print!("\x1B[2J\x1B[1;1H");
}

/// Format duration for display
fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Get current timestamp for logging
fn timestamp() -> String {
    use std::time::SystemTime;
    let now = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
    let secs = now.as_secs() % 86400;
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Existing directories to observe, without duplicates.
pub fn watch_dirs(environment: &Environment) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for dir in environment.pipelines().iter().flat_map(|p| p.watch_dirs()) {
        if dir.is_dir() && !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

/// Re-expand globs and return the pipelines a set of changed paths affects.
pub fn affected_pipelines(environment: &mut Environment, changed: &[PathBuf]) -> Vec<String> {
    let mut affected = Vec::new();
    for pipeline in environment.pipelines_mut() {
        if let Err(e) = pipeline.refresh_inputs() {
            warn!(pipeline = %pipeline.name(), error = %e, "could not refresh inputs");
        }
        if changed.iter().any(|path| pipeline.affected_by(path)) {
            affected.push(pipeline.name().to_string());
        }
    }
    affected
}

/// Rebuild the pipelines affected by `changed`.
///
/// Returns `None` when no pipeline cares about the changed paths.
pub fn rebuild(environment: &mut Environment, changed: &[PathBuf]) -> Option<BuildResult> {
    let affected = affected_pipelines(environment, changed);
    if affected.is_empty() {
        debug!(paths = changed.len(), "change does not affect any pipeline");
        return None;
    }
    Some(AssetBuild::new().with_filter(affected).build(environment))
}

fn record(manifest: &mut UrlManifest, path: Option<&Path>, result: &BuildResult) {
    let Some(path) = path else { return };
    for pipeline in result.pipelines.iter().filter(|p| p.is_success()) {
        manifest.insert(pipeline.pipeline.clone(), pipeline.urls.clone());
    }
    if let Err(e) = manifest.save(path) {
        error!(path = %path.display(), error = %e, "could not write manifest");
    }
}

/// Watch the inputs of every pipeline and rebuild on change.
///
/// This function blocks and runs until interrupted (Ctrl+C).
pub fn watch_environment(mut environment: Environment, options: WatchOptions) -> Result<(), WatchError> {
    let dirs = watch_dirs(&environment);
    if dirs.is_empty() {
        return Err(WatchError::NothingToWatch(environment.name().to_string()));
    }

    let (tx, rx) = channel();
    let debounce_duration = Duration::from_millis(options.config.debounce_ms as u64);
    let mut debouncer = new_debouncer(debounce_duration, tx).map_err(WatchError::WatcherInit)?;
    for dir in &dirs {
        debouncer.watcher().watch(dir, RecursiveMode::Recursive).map_err(WatchError::WatchPath)?;
    }

    let mut tracker = FailureTracker::new();
    let mut manifest = UrlManifest::new();

    if options.config.clear_screen {
        clear_screen();
    }
    println!("[{}] Building...", timestamp());
    let result = AssetBuild::new().build(&mut environment);
    tracker.update(&result);
    print_build_result(&result, &[]);
    record(&mut manifest, options.manifest.as_deref(), &result);
    println!("[{}] Watching {} director{} for changes...", timestamp(), dirs.len(), if dirs.len() == 1 { "y" } else { "ies" });

    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let changed: Vec<PathBuf> = events
                    .iter()
                    .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                    .map(|e| e.path.clone())
                    .collect();
                if changed.is_empty() {
                    continue;
                }

                let Some(result) = rebuild(&mut environment, &changed) else {
                    continue;
                };

                if options.config.clear_screen {
                    clear_screen();
                }
                for path in &changed {
                    if let Some(name) = path.file_name() {
                        println!("[{}] Changed: {}", timestamp(), name.to_string_lossy());
                    }
                }

                let recovered = tracker.update(&result);
                print_build_result(&result, &recovered);
                record(&mut manifest, options.manifest.as_deref(), &result);
            }
            Ok(Err(error)) => {
                eprintln!("[{}] Watch error: {:?}", timestamp(), error);
                eprintln!("[{}] Continuing to watch...", timestamp());
            }
            Err(e) => {
                return Err(WatchError::ChannelError(e.to_string()));
            }
        }
    }
}

/// Print build result to console with recovered pipeline notifications
fn print_build_result(result: &BuildResult, recovered: &[String]) {
    for pipeline in recovered {
        println!("[{}] Fixed: {}", timestamp(), pipeline);
    }

    if result.is_success() {
        println!(
            "[{}] Build complete ({}) - Built: {} | Clean: {}",
            timestamp(),
            format_duration(result.total_duration),
            result.built_count(),
            result.clean_count()
        );
    } else {
        let failed = result.failed_count();
        println!(
            "[{}] Build failed ({}) - {} pipeline{} failed",
            timestamp(),
            format_duration(result.total_duration),
            failed,
            if failed == 1 { "" } else { "s" }
        );
        for pipeline in result.failures() {
            eprintln!("[{}] Error in {}: {}", timestamp(), pipeline.pipeline, pipeline.status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::PipelineResult;
    use crate::pipeline::Pipeline;
    use crate::stage::{Gather, Output};
    use crate::storage::MemoryStorage;
    use std::fs;
    use tempfile::TempDir;

    fn environment(temp: &TempDir) -> Environment {
        fs::create_dir_all(temp.path().join("css")).unwrap();
        fs::create_dir_all(temp.path().join("js")).unwrap();
        fs::write(temp.path().join("css/a.css"), "a{}").unwrap();
        fs::write(temp.path().join("js/app.js"), "go()").unwrap();
        fs::write(temp.path().join("header.js"), "/* hi */").unwrap();

        let css = Pipeline::builder("css", Gather::paths(temp.path(), ["css/*.css"]).unwrap())
            .bundle("site.css")
            .output(Output::new(Box::new(MemoryStorage::new())));
        let js = Pipeline::builder("js", Gather::paths(temp.path(), ["js/app.js"]).unwrap())
            .prepend(["header.js"])
            .output(Output::new(Box::new(MemoryStorage::new())));
        Environment::new("dev", true).with_pipeline(css).with_pipeline(js)
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
        assert_eq!(format_duration(Duration::from_millis(999)), "999ms");
        assert_eq!(format_duration(Duration::from_millis(1000)), "1.00s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn test_watch_dirs_are_existing_and_unique() {
        let temp = TempDir::new().unwrap();
        let env = environment(&temp);
        let dirs = watch_dirs(&env);
        assert_eq!(
            dirs,
            vec![temp.path().join("css"), temp.path().join("js"), temp.path().to_path_buf()]
        );
    }

    #[test]
    fn test_affected_pipelines() {
        let temp = TempDir::new().unwrap();
        let mut env = environment(&temp);

        let changed = vec![temp.path().join("css/a.css")];
        assert_eq!(affected_pipelines(&mut env, &changed), vec!["css"]);

        let changed = vec![temp.path().join("header.js")];
        assert_eq!(affected_pipelines(&mut env, &changed), vec!["js"]);

        let changed = vec![temp.path().join("README.md")];
        assert!(affected_pipelines(&mut env, &changed).is_empty());
    }

    #[test]
    fn test_rebuild_picks_up_new_glob_match() {
        let temp = TempDir::new().unwrap();
        let mut env = environment(&temp);
        AssetBuild::new().build(&mut env);

        let added = temp.path().join("css/b.css");
        fs::write(&added, "b{}").unwrap();
        let result = rebuild(&mut env, &[added]).unwrap();

        assert_eq!(result.pipelines.len(), 1);
        assert_eq!(result.pipelines[0].pipeline, "css");
        assert_eq!(result.built_count(), 1);
    }

    #[test]
    fn test_rebuild_ignores_unrelated_paths() {
        let temp = TempDir::new().unwrap();
        let mut env = environment(&temp);
        assert!(rebuild(&mut env, &[temp.path().join("notes.txt")]).is_none());
    }

    #[test]
    fn test_nothing_to_watch() {
        let temp = TempDir::new().unwrap();
        let css = Pipeline::builder("css", Gather::paths(temp.path().join("gone"), ["a.css"]).unwrap())
            .output(Output::new(Box::new(MemoryStorage::new())));
        let env = Environment::new("dev", true).with_pipeline(css);

        let result = watch_environment(env, WatchOptions::default());
        assert!(matches!(result, Err(WatchError::NothingToWatch(_))));
    }

    #[test]
    fn test_failure_tracker_detects_recovery() {
        let mut tracker = FailureTracker::new();

        let mut first = BuildResult::new();
        first.add_result(PipelineResult::failed("css".to_string(), "boom".to_string(), Duration::ZERO));
        first.add_result(PipelineResult::failed("js".to_string(), "boom".to_string(), Duration::ZERO));
        assert!(tracker.update(&first).is_empty());
        assert_eq!(tracker.failure_count(), 2);

        let mut second = BuildResult::new();
        second.add_result(PipelineResult::built("css".to_string(), vec![], Duration::ZERO));
        let recovered = tracker.update(&second);
        assert_eq!(recovered, vec!["css"]);
        assert!(tracker.has_failures());
    }
}
