//! Request serving over the pipelines of one environment.
//!
//! A request path is routed to the pipeline whose URL root prefixes it. The
//! fingerprint segment of the file name is ignored, so pages rendered against
//! an older build still receive the current content. In a live environment
//! the pipeline runs before its storage is read, and a failed run is reported
//! as an error instead of falling back to whatever storage holds.

use thiserror::Error;
use tracing::{debug, warn};

use crate::build::Environment;
use crate::error::PipelineError;
use crate::fingerprint::base_name;
use crate::stage::ServedAsset;

/// Content type for a stored name, by extension.
pub fn content_type_for(name: &str) -> &'static str {
    let file = name.rsplit('/').next().unwrap_or(name);
    match file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "css" => "text/css",
        Some(ext) if ext == "js" => "text/javascript",
        _ => "application/octet-stream",
    }
}

/// The path part of a URL root, with leading and trailing slashes.
///
/// `https://cdn.example.com/static` routes as `/static/`.
pub fn route_prefix(url_root: &str) -> String {
    let path = match url_root.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("/", |i| &rest[i..]),
        None => url_root,
    };
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

/// Serving failure.
#[derive(Debug, Error)]
pub enum ServeError {
    /// No pipeline produces the requested path.
    #[error("no asset at {0}")]
    NotFound(String),

    /// A live pipeline failed while building on demand.
    #[error("pipeline '{pipeline}' failed while serving: {source}")]
    RunFailed {
        pipeline: String,
        #[source]
        source: PipelineError,
    },

    /// Predicting or fetching failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Serves stored artifacts of an [`Environment`].
#[derive(Debug)]
pub struct AssetServer {
    environment: Environment,
}

impl AssetServer {
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Give the environment back.
    pub fn into_environment(self) -> Environment {
        self.environment
    }

    /// Resolve a request path such as `/static/site.0123456789abcdef.css`.
    pub fn serve(&mut self, request_path: &str) -> Result<ServedAsset, ServeError> {
        let path = request_path.split(['?', '#']).next().unwrap_or(request_path);
        let path = if path.starts_with('/') { path.to_string() } else { format!("/{}", path) };
        let live = self.environment.is_live();

        for pipeline in self.environment.pipelines_mut() {
            let prefix = route_prefix(pipeline.url_root());
            let Some(relative) = path.strip_prefix(prefix.as_str()) else {
                continue;
            };
            if relative.is_empty() || !pipeline.resolves(relative)? {
                continue;
            }

            if live {
                if let Err(source) = pipeline.run() {
                    warn!(pipeline = %pipeline.name(), error = %source, "on-demand run failed");
                    return Err(ServeError::RunFailed { pipeline: pipeline.name().to_string(), source });
                }
            }

            debug!(pipeline = %pipeline.name(), request = %path, base = %base_name(relative), "serving");
            return pipeline.serve(relative)?.ok_or_else(|| ServeError::NotFound(path.clone()));
        }

        Err(ServeError::NotFound(path))
    }
}
