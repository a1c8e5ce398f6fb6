//! Build System Test Suite
//!
//! Integration tests from `assetpipe.toml` to served bytes:
//!
//! - Config discovery and loading
//! - Environment construction through the stage registry
//! - Build-all with per-environment URL manifests
//! - Live and precomputed URL catalogs
//! - Request serving, including failed on-demand runs

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use serial_test::serial;
use tempfile::TempDir;

use assetpipe::build::{
    build_environment, manifest_path, AssetBuild, AssetCatalog, BuildStatus, CatalogError, Environment,
    UrlManifest,
};
use assetpipe::config::{find_config, load_config, AssetConfig};
use assetpipe::registry::StageRegistry;
use assetpipe::serve::{AssetServer, ServeError};

// ============================================================================
// Test Utilities
// ============================================================================

const CONFIG: &str = r#"
[project]
name = "site"
root = "static"
active = "dev"

[manifest]
path = "build/assets.json"

[environments.dev]
live = true

[environments.dev.pipelines.css]
inputs = ["css/*.css"]
stages = [
  { kind = "bundle", output = "site.css" },
  { kind = "hash-names" },
]
output = { storage = "filesystem", directory = "build/static", url_root = "/static/" }

[environments.dev.pipelines.js]
inputs = ["js/vendor.js", "js/app.js"]
stages = [{ kind = "prepend", files = ["license.js"] }]
output = { storage = "filesystem", directory = "build/static", url_root = "/static/", strip_prefix = "js/" }

[environments.prod]
live = false

[environments.prod.pipelines.css]
inputs = ["css/*.css"]
stages = [
  { kind = "bundle", output = "site.css" },
  { kind = "hash-names" },
]
output = { storage = "filesystem", directory = "build/static", url_root = "https://cdn.example.com/static/" }
"#;

/// Create a test file with content.
fn create_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

/// A project directory with sources and `assetpipe.toml`.
fn create_project() -> (TempDir, AssetConfig) {
    let temp = TempDir::new().unwrap();
    create_test_file(temp.path(), "assetpipe.toml", CONFIG);
    create_test_file(temp.path(), "static/css/a.css", "a{}");
    create_test_file(temp.path(), "static/css/b.css", "b{}");
    create_test_file(temp.path(), "static/js/vendor.js", "lib();");
    create_test_file(temp.path(), "static/js/app.js", "app();");
    create_test_file(temp.path(), "static/license.js", "/* MIT */");

    let config = load_config(Some(&temp.path().join("assetpipe.toml"))).unwrap();
    (temp, config)
}

fn environment(temp: &TempDir, config: &AssetConfig, name: &str) -> Environment {
    Environment::from_config(config, name, temp.path(), &StageRegistry::with_defaults()).unwrap()
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
#[serial]
fn test_find_config_from_subdirectory() {
    let (temp, _) = create_project();
    let original = std::env::current_dir().unwrap();

    std::env::set_current_dir(temp.path().join("static/css")).unwrap();
    let found = find_config();
    std::env::set_current_dir(original).unwrap();

    let found = found.expect("config should be found from a subdirectory");
    assert_eq!(found.canonicalize().unwrap(), temp.path().join("assetpipe.toml").canonicalize().unwrap());
}

#[test]
fn test_invalid_config_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = create_test_file(
        temp.path(),
        "assetpipe.toml",
        r#"
[project]
name = "site"

[environments.dev.pipelines.css]
inputs = []
output = { storage = "filesystem" }
"#,
    );

    let err = load_config(Some(&path)).unwrap_err().to_string();
    assert!(err.contains("inputs"));
    assert!(err.contains("output.directory"));
}

// ============================================================================
// Build Tests
// ============================================================================

#[test]
fn test_build_writes_outputs_and_manifest() {
    let (temp, config) = create_project();
    let mut env = environment(&temp, &config, "dev");

    let result = build_environment(&mut env, false);
    assert!(result.is_success(), "{}", result.summary());
    assert_eq!(result.built_count(), 2);

    let css_urls = &result.pipelines[0].urls;
    assert_eq!(css_urls.len(), 1);
    assert!(css_urls[0].starts_with("/static/site."));
    let css_file = temp.path().join("build/static").join(css_urls[0].trim_start_matches("/static/"));
    assert_eq!(fs::read_to_string(css_file).unwrap(), "a{}b{}");

    // Splice output keeps its own name; strip_prefix only touches js/.
    assert_eq!(
        result.pipelines[1].urls,
        vec!["/static/license.js", "/static/vendor.js", "/static/app.js"]
    );

    let path = temp.path().join(manifest_path(&config.manifest.path, env.name()));
    UrlManifest::from_build(&result).save(&path).unwrap();
    assert!(path.ends_with("build/assets.dev.json"));

    let manifest = UrlManifest::load(&path).unwrap();
    assert_eq!(manifest.urls("css"), Some(css_urls.as_slice()));
}

#[test]
fn test_rebuild_is_clean_until_input_changes() {
    let (temp, config) = create_project();
    let mut env = environment(&temp, &config, "dev");
    build_environment(&mut env, false);

    let second = build_environment(&mut env, false);
    assert_eq!(second.clean_count(), 2);

    fs::write(temp.path().join("static/css/a.css"), "a{color:red}").unwrap();
    let file = File::options().write(true).open(temp.path().join("static/css/a.css")).unwrap();
    file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(10)).unwrap();

    let third = AssetBuild::new().with_filter(vec!["css".to_string()]).build(&mut env);
    assert_eq!(third.pipelines[0].status, BuildStatus::Built);
    assert_eq!(third.pipelines[0].removed.len(), 1);
}

#[test]
fn test_fresh_process_trusts_existing_outputs() {
    let (temp, config) = create_project();
    build_environment(&mut environment(&temp, &config, "dev"), false);

    let mut again = environment(&temp, &config, "dev");
    let result = build_environment(&mut again, false);
    assert_eq!(result.clean_count(), 2);
}

// ============================================================================
// Catalog and Serving Tests
// ============================================================================

#[test]
fn test_precomputed_catalog_reads_manifest_only() {
    let (temp, config) = create_project();

    let mut prod = environment(&temp, &config, "prod");
    let result = build_environment(&mut prod, false);
    let path = temp.path().join(manifest_path(&config.manifest.path, "prod"));
    UrlManifest::from_build(&result).save(&path).unwrap();

    // Remove the outputs: a precomputed catalog must not notice or rebuild.
    fs::remove_dir_all(temp.path().join("build/static")).unwrap();

    let mut catalog =
        AssetCatalog::for_environment(environment(&temp, &config, "prod"), |_| UrlManifest::load(&path)).unwrap();
    let url = catalog.output_url("css").unwrap();
    assert!(url.starts_with("https://cdn.example.com/static/site."));
    assert!(!temp.path().join("build/static").exists());
    assert!(matches!(catalog.output_urls("js"), Err(CatalogError::UnknownPipeline(_))));
}

#[test]
fn test_server_runs_live_pipeline_on_demand() {
    let (temp, config) = create_project();
    let mut server = AssetServer::new(environment(&temp, &config, "dev"));

    let asset = server.serve("/static/site.0000000000000000.css").unwrap();
    assert_eq!(asset.content, b"a{}b{}");
    assert_eq!(asset.content_type, "text/css");

    let js = server.serve("/static/app.js?v=1").unwrap();
    assert_eq!(js.content, b"app();");
    assert_eq!(js.content_type, "text/javascript");

    assert!(matches!(server.serve("/static/missing.css"), Err(ServeError::NotFound(_))));
    assert!(matches!(server.serve("/other/site.css"), Err(ServeError::NotFound(_))));
}

#[test]
fn test_server_reports_failed_run() {
    let (temp, config) = create_project();
    let mut server = AssetServer::new(environment(&temp, &config, "dev"));
    server.serve("/static/app.js").unwrap();

    fs::remove_file(temp.path().join("static/license.js")).unwrap();

    let err = server.serve("/static/app.js").unwrap_err();
    assert!(matches!(err, ServeError::RunFailed { ref pipeline, .. } if pipeline == "js"));
}

#[test]
fn test_server_routes_absolute_url_root() {
    let (temp, config) = create_project();
    let mut prod = environment(&temp, &config, "prod");
    build_environment(&mut prod, false);

    let mut server = AssetServer::new(prod);
    let asset = server.serve("/static/site.css").unwrap();
    assert_eq!(asset.content, b"a{}b{}");
}
