//! URL queries for the presentation layer.
//!
//! A live catalog asks the pipelines themselves and may run them first. A
//! precomputed catalog only reads the manifest written by an offline build
//! and never runs anything.

use thiserror::Error;

use crate::build::{Environment, ManifestError, UrlManifest};
use crate::error::PipelineError;

/// URL query failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    /// Neither the environment nor the manifest knows the pipeline.
    #[error("unknown pipeline '{0}'")]
    UnknownPipeline(String),
    /// A single URL was asked of a pipeline with several outputs.
    #[error("pipeline '{pipeline}' has {count} outputs; ask for all of its URLs instead")]
    MultipleOutputs { pipeline: String, count: usize },
    /// The pipeline has no outputs at all.
    #[error("pipeline '{0}' has no outputs")]
    NoOutputs(String),
    /// Running or predicting a live pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// The manifest could not be read.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Source of public URLs.
#[derive(Debug)]
pub enum AssetCatalog {
    /// Query (and run) the pipelines directly.
    Live(Environment),
    /// Read a manifest produced by `assetpipe build`.
    Precomputed(UrlManifest),
}

impl AssetCatalog {
    /// Catalog for an environment, honoring its `live` flag.
    ///
    /// `load_manifest` is only called for precomputed environments.
    pub fn for_environment<F>(environment: Environment, load_manifest: F) -> Result<Self, CatalogError>
    where
        F: FnOnce(&str) -> Result<UrlManifest, ManifestError>,
    {
        if environment.is_live() {
            return Ok(Self::Live(environment));
        }
        Ok(Self::Precomputed(load_manifest(environment.name())?))
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    /// Public URLs of a pipeline's outputs.
    ///
    /// A live catalog runs the pipeline first when it is dirty.
    pub fn output_urls(&mut self, pipeline: &str) -> Result<Vec<String>, CatalogError> {
        match self {
            Self::Live(environment) => {
                let p = environment
                    .pipeline_mut(pipeline)
                    .ok_or_else(|| CatalogError::UnknownPipeline(pipeline.to_string()))?;
                p.run()?;
                Ok(p.output_urls()?)
            }
            Self::Precomputed(manifest) => manifest
                .urls(pipeline)
                .map(<[String]>::to_vec)
                .ok_or_else(|| CatalogError::UnknownPipeline(pipeline.to_string())),
        }
    }

    /// The single public URL of a pipeline with exactly one output.
    pub fn output_url(&mut self, pipeline: &str) -> Result<String, CatalogError> {
        let mut urls = self.output_urls(pipeline)?;
        match urls.len() {
            0 => Err(CatalogError::NoOutputs(pipeline.to_string())),
            1 => Ok(urls.remove(0)),
            count => Err(CatalogError::MultipleOutputs { pipeline: pipeline.to_string(), count }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::stage::{Gather, Output};
    use crate::storage::MemoryStorage;
    use std::fs;
    use tempfile::TempDir;

    fn live(temp: &TempDir) -> (AssetCatalog, MemoryStorage) {
        fs::write(temp.path().join("a.css"), "a{}").unwrap();
        fs::write(temp.path().join("b.css"), "b{}").unwrap();
        let storage = MemoryStorage::new();
        let css = Pipeline::builder("css", Gather::paths(temp.path(), ["a.css"]).unwrap())
            .output(Output::new(Box::new(storage.clone())).with_url_root("/static/"));
        let many = Pipeline::builder("many", Gather::paths(temp.path(), ["a.css", "b.css"]).unwrap())
            .output(Output::new(Box::new(MemoryStorage::new())));
        let env = Environment::new("dev", true).with_pipeline(css).with_pipeline(many);
        (AssetCatalog::for_environment(env, |_| unreachable!()).unwrap(), storage)
    }

    #[test]
    fn test_live_runs_pipeline() {
        let temp = TempDir::new().unwrap();
        let (mut catalog, storage) = live(&temp);

        assert_eq!(catalog.output_url("css").unwrap(), "/static/a.css");
        assert_eq!(storage.names(), vec!["a.css"]);
    }

    #[test]
    fn test_single_url_of_multi_output_pipeline() {
        let temp = TempDir::new().unwrap();
        let (mut catalog, _) = live(&temp);

        assert_eq!(catalog.output_urls("many").unwrap(), vec!["/a.css", "/b.css"]);
        assert!(matches!(catalog.output_url("many"), Err(CatalogError::MultipleOutputs { count: 2, .. })));
        assert!(matches!(catalog.output_urls("nope"), Err(CatalogError::UnknownPipeline(_))));
    }

    #[test]
    fn test_precomputed_never_runs() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.css"), "a{}").unwrap();
        let storage = MemoryStorage::new();
        let css = Pipeline::builder("css", Gather::paths(temp.path(), ["a.css"]).unwrap())
            .output(Output::new(Box::new(storage.clone())));
        let env = Environment::new("prod", false).with_pipeline(css);

        let mut catalog = AssetCatalog::for_environment(env, |name| {
            assert_eq!(name, "prod");
            let mut manifest = UrlManifest::new();
            manifest.insert("css", vec!["/static/a.0123456789abcdef.css".to_string()]);
            Ok(manifest)
        })
        .unwrap();

        assert!(!catalog.is_live());
        assert_eq!(catalog.output_url("css").unwrap(), "/static/a.0123456789abcdef.css");
        assert_eq!(storage.writes(), 0);
    }
}
