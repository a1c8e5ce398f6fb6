//! Stage and storage registry
//!
//! Maps the `kind` names used in `assetpipe.toml` to constructors. The
//! registry is an ordinary value handed to whoever builds pipelines from
//! configuration, so tests and embedders can register their own stages
//! without touching process-wide state.

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::clock::{ClockStore, JsonFileClock, MemoryClock};
use crate::config::ToolsConfig;
use crate::error::{PipelineError, Result};
use crate::stage::{Bundle, HashNames, Splice, ToolScope, ToolStage, Transform, WatchGate};
use crate::storage::{FilesystemStorage, MemoryStorage, Storage};
use crate::tool::{presets, DiagnosticPolicy, InputChannel, ToolCommand};

/// Everything a transform constructor may look at.
#[derive(Debug, Clone, Copy)]
pub struct StageArgs<'a> {
    /// Pipeline being built
    pub pipeline: &'a str,
    /// Stage kind as written in the config
    pub kind: &'a str,
    /// Options next to `kind`
    pub options: &'a toml::Table,
    /// `[tools]` section
    pub tools: &'a ToolsConfig,
    /// Input base directory
    pub root: &'a Path,
    /// Clock file for `watch` stages, if configured
    pub clock_file: Option<&'a Path>,
}

impl<'a> StageArgs<'a> {
    fn invalid(&self, key: &str, expected: &str) -> PipelineError {
        PipelineError::configuration(format!(
            "pipeline '{}', stage '{}': option '{}' must be {}",
            self.pipeline, self.kind, key, expected
        ))
    }

    /// Optional string option.
    pub fn str(&self, key: &str) -> Result<Option<&'a str>> {
        match self.options.get(key) {
            None => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(self.invalid(key, "a string")),
        }
    }

    /// Required string option.
    pub fn required_str(&self, key: &str) -> Result<&'a str> {
        self.str(key)?.ok_or_else(|| {
            PipelineError::configuration(format!(
                "pipeline '{}', stage '{}': missing required option '{}'",
                self.pipeline, self.kind, key
            ))
        })
    }

    /// String option with a default.
    pub fn str_or(&self, key: &str, default: &'a str) -> Result<&'a str> {
        Ok(self.str(key)?.unwrap_or(default))
    }

    /// List-of-strings option; absent means empty.
    pub fn string_list(&self, key: &str) -> Result<Vec<String>> {
        match self.options.get(key) {
            None => Ok(Vec::new()),
            Some(toml::Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or_else(|| self.invalid(key, "a list of strings")))
                .collect(),
            Some(_) => Err(self.invalid(key, "a list of strings")),
        }
    }

    /// Option deserialized through serde, e.g. an enum spelled as a string.
    pub fn parse<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.options.get(key) {
            None => Ok(None),
            Some(value) => value.clone().try_into().map(Some).map_err(|e| {
                PipelineError::configuration(format!(
                    "pipeline '{}', stage '{}': invalid option '{}': {}",
                    self.pipeline, self.kind, key, e
                ))
            }),
        }
    }
}

/// Everything a storage constructor may look at.
#[derive(Debug, Clone, Copy)]
pub struct StorageArgs<'a> {
    /// Pipeline being built
    pub pipeline: &'a str,
    /// Storage kind as written in the config
    pub kind: &'a str,
    /// Storage root, already resolved against the project directory
    pub directory: Option<&'a Path>,
    /// Reject writes
    pub read_only: bool,
}

type TransformFactory = Box<dyn Fn(&StageArgs<'_>) -> Result<Box<dyn Transform>> + Send + Sync>;
type StorageFactory = Box<dyn Fn(&StorageArgs<'_>) -> Result<Box<dyn Storage>> + Send + Sync>;

/// Named constructors for transforms and storages.
pub struct StageRegistry {
    transforms: BTreeMap<String, TransformFactory>,
    storages: BTreeMap<String, StorageFactory>,
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRegistry")
            .field("transforms", &self.transform_kinds())
            .field("storages", &self.storage_kinds())
            .finish()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl StageRegistry {
    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Self { transforms: BTreeMap::new(), storages: BTreeMap::new() }
    }

    /// A registry with every built-in stage and storage.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();

        registry.register_transform("bundle", |args| {
            Ok(Box::new(Bundle::new(args.required_str("output")?)))
        });
        registry.register_transform("prepend", |args| {
            Ok(Box::new(Splice::prepend(args.string_list("files")?)))
        });
        registry.register_transform("append", |args| {
            Ok(Box::new(Splice::append(args.string_list("files")?)))
        });
        registry.register_transform("hash-names", |_| Ok(Box::new(HashNames)));
        registry.register_transform("sass", |args| {
            Ok(Box::new(presets::sass(args.tools, args.root, args.str_or("style", "expanded")?)?))
        });
        registry.register_transform("yui", |args| Ok(Box::new(presets::yui(args.tools))));
        registry.register_transform("closure-compiler", |args| {
            Ok(Box::new(presets::closure_compiler(
                args.tools,
                args.str_or("language_in", "ECMASCRIPT5_STRICT")?,
                args.str_or("compilation_level", "SIMPLE_OPTIMIZATIONS")?,
            )?))
        });
        registry.register_transform("closure-builder", |args| {
            Ok(Box::new(presets::closure_builder(
                args.tools,
                &args.string_list("roots")?,
                &args.string_list("namespaces")?,
            )?))
        });
        registry.register_transform("command", |args| Ok(Box::new(command_stage(args)?)));
        registry.register_transform("watch", |args| {
            let id = args.str_or("id", args.pipeline)?;
            let clock: Box<dyn ClockStore> = match args.clock_file {
                Some(path) => Box::new(JsonFileClock::new(path)),
                None => Box::new(MemoryClock::new()),
            };
            Ok(Box::new(WatchGate::new(id, clock)))
        });

        registry.register_storage("memory", |_| Ok(Box::new(MemoryStorage::new())));
        registry.register_storage("null", |_| Ok(Box::new(MemoryStorage::new())));
        registry.register_storage("filesystem", |args| {
            let directory = args.directory.ok_or_else(|| {
                PipelineError::configuration(format!(
                    "pipeline '{}': filesystem storage needs `output.directory`",
                    args.pipeline
                ))
            })?;
            let storage = if args.read_only {
                FilesystemStorage::read_only(directory)
            } else {
                FilesystemStorage::new(directory)
            };
            Ok(Box::new(storage))
        });

        registry
    }

    /// Register (or replace) a transform constructor.
    pub fn register_transform<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&StageArgs<'_>) -> Result<Box<dyn Transform>> + Send + Sync + 'static,
    {
        self.transforms.insert(kind.into(), Box::new(factory));
    }

    /// Register (or replace) a storage constructor.
    pub fn register_storage<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&StorageArgs<'_>) -> Result<Box<dyn Storage>> + Send + Sync + 'static,
    {
        self.storages.insert(kind.into(), Box::new(factory));
    }

    /// Registered transform kinds, sorted.
    pub fn transform_kinds(&self) -> Vec<String> {
        self.transforms.keys().cloned().collect()
    }

    /// Registered storage kinds, sorted.
    pub fn storage_kinds(&self) -> Vec<String> {
        self.storages.keys().cloned().collect()
    }

    /// Build the transform registered as `args.kind`.
    pub fn create_transform(&self, args: &StageArgs<'_>) -> Result<Box<dyn Transform>> {
        let factory = self.transforms.get(args.kind).ok_or_else(|| PipelineError::UnknownStageKind {
            kind: args.kind.to_string(),
            available: self.transform_kinds(),
        })?;
        factory(args)
    }

    /// Build the storage registered as `args.kind`.
    pub fn create_storage(&self, args: &StorageArgs<'_>) -> Result<Box<dyn Storage>> {
        let factory = self.storages.get(args.kind).ok_or_else(|| PipelineError::UnknownStageKind {
            kind: args.kind.to_string(),
            available: self.storage_kinds(),
        })?;
        factory(args)
    }
}

/// Generic external command stage.
fn command_stage(args: &StageArgs<'_>) -> Result<ToolStage> {
    let name = args.str_or("name", "command")?;
    let mut command = ToolCommand::new(name, args.required_str("program")?)
        .with_args(args.string_list("args")?)
        .with_input(args.parse::<InputChannel>("input")?.unwrap_or_default())
        .with_diagnostics(args.parse::<DiagnosticPolicy>("diagnostics")?.unwrap_or_default())
        .with_timeout(args.tools.timeout());
    command = command.with_setting(format!("pipelines.{}.stages.program", args.pipeline));

    let mut stage = ToolStage::new(name, command)
        .with_extensions(args.string_list("extensions")?)
        .with_scope(args.parse::<ToolScope>("scope")?.unwrap_or_default());
    if let Some(ext) = args.str("output_extension")? {
        stage = stage.with_output_extension(ext);
    }
    Ok(stage)
}
