//! Pipeline construction and the run orchestrator.
//!
//! A [`Pipeline`] is assembled with a consuming [`PipelineBuilder`]: every
//! attachment takes the builder by value, so a stage can only ever have one
//! downstream consumer. [`PipelineBuilder::output`] closes the chain.
//!
//! Every run walks the chain twice:
//!
//! 1. **predict**: names only, from [`Gather`] through every [`Transform`].
//!    The identity and the expected output names fall out of this pass.
//! 2. **execute**: only when the output or a stage reports dirty. Artifacts
//!    flow stage to stage in declared order and are committed once, at the end.
//!
//! Any error aborts the run before commit, so storage never sees a partial set.

use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};
use tracing::{debug, info};

use crate::clock::ClockStore;
use crate::error::{PipelineError, Result};
use crate::fingerprint::{structure_hash, PipelineIdentity};
use crate::stage::{
    Bundle, CommitReport, Gather, HashNames, Output, ServedAsset, Splice, StageContext, Transform,
    WatchGate,
};

/// Result of a [`Pipeline::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing was dirty; no stage executed and nothing was written.
    Clean,
    /// The chain executed and its artifacts were committed.
    Built(CommitReport),
}

impl RunOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, RunOutcome::Clean)
    }
}

/// Output of the predict pass.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// Identity of the pipeline as of this pass
    pub identity: PipelineIdentity,
    /// Names announced by each stage, gather first
    pub predictions: Vec<Vec<String>>,
    /// When the pass started
    pub started: SystemTime,
}

impl Prepared {
    /// Names the pipeline would commit if run now.
    pub fn expected(&self) -> &[String] {
        self.predictions.last().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Builder for a [`Pipeline`]; each call consumes and returns it.
#[derive(Debug)]
pub struct PipelineBuilder {
    name: String,
    gather: Gather,
    stages: Vec<Box<dyn Transform>>,
}

impl PipelineBuilder {
    /// Start a pipeline rooted at `gather`.
    pub fn new(name: impl Into<String>, gather: Gather) -> Self {
        Self { name: name.into(), gather, stages: Vec::new() }
    }

    /// Attach a transform stage.
    pub fn then<T: Transform + 'static>(self, stage: T) -> Self {
        self.then_boxed(Box::new(stage))
    }

    /// Attach an already boxed transform stage.
    pub fn then_boxed(mut self, stage: Box<dyn Transform>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Concatenate everything into `output`.
    pub fn bundle(self, output: impl Into<String>) -> Self {
        self.then(Bundle::new(output))
    }

    /// Splice files before the set.
    pub fn prepend<I, S>(self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.then(Splice::prepend(files))
    }

    /// Splice files after the set.
    pub fn append<I, S>(self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.then(Splice::append(files))
    }

    /// Embed the pipeline fingerprint in every name.
    pub fn hash_names(self) -> Self {
        self.then(HashNames)
    }

    /// Gate re-execution on a last-run clock.
    pub fn watch(self, watcher_id: impl Into<String>, clock: Box<dyn ClockStore>) -> Self {
        self.then(WatchGate::new(watcher_id, clock))
    }

    /// Close the chain with its terminal stage.
    pub fn output(self, output: Output) -> Pipeline {
        Pipeline { name: self.name, gather: self.gather, stages: self.stages, output }
    }
}

/// A fully assembled `Gather → Transform* → Output` chain.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    gather: Gather,
    stages: Vec<Box<dyn Transform>>,
    output: Output,
}

fn context<'a>(
    name: &'a str,
    gather: &'a Gather,
    identity: &'a PipelineIdentity,
    started: SystemTime,
) -> StageContext<'a> {
    StageContext { pipeline: name, identity, inputs: gather.inputs(), root: gather.root(), started }
}

/// Compare two name lists as sets.
fn same_names(a: &[String], b: &[String]) -> bool {
    let mut a: Vec<&String> = a.iter().collect();
    let mut b: Vec<&String> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}

impl Pipeline {
    /// Start building a pipeline.
    pub fn builder(name: impl Into<String>, gather: Gather) -> PipelineBuilder {
        PipelineBuilder::new(name, gather)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base directory inputs resolve against.
    pub fn root(&self) -> &Path {
        self.gather.root()
    }

    /// URL prefix of the output stage.
    pub fn url_root(&self) -> &str {
        self.output.url_root()
    }

    /// Registered kinds of the transform stages, in order.
    pub fn stage_kinds(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    /// The terminal stage.
    pub fn output_stage(&self) -> &Output {
        &self.output
    }

    /// Compute the identity from configuration and current inputs.
    pub fn identity(&self) -> PipelineIdentity {
        let stage_hashes: Vec<String> = std::iter::once(self.gather.fingerprint().to_string())
            .chain(self.stages.iter().map(|s| s.fingerprint()))
            .collect();
        let structure = structure_hash(stage_hashes.iter().map(String::as_str));

        let extra: Vec<_> = self.stages.iter().flat_map(|s| s.extra_inputs()).collect();
        PipelineIdentity::new(structure, self.gather.input_hash(&extra))
    }

    /// Run the predict pass.
    pub fn prepare(&self) -> Result<Prepared> {
        let started = SystemTime::now();
        let identity = self.identity();
        let ctx = context(&self.name, &self.gather, &identity, started);

        let mut predictions = Vec::with_capacity(self.stages.len() + 1);
        let mut names = self.gather.predict();
        for stage in &self.stages {
            predictions.push(names.clone());
            names = stage.predict(&ctx, names)?;
        }
        predictions.push(names);

        debug!(
            pipeline = %self.name,
            fingerprint = %identity.fingerprint,
            expected = ?predictions.last(),
            "prepared"
        );
        Ok(Prepared { identity, predictions, started })
    }

    /// Names the pipeline would commit if run now.
    pub fn expected_output_names(&self) -> Result<Vec<String>> {
        let prepared = self.prepare()?;
        Ok(prepared.expected().to_vec())
    }

    /// Whether a run would execute.
    pub fn is_dirty(&self) -> Result<bool> {
        let prepared = self.prepare()?;
        self.dirty(&prepared)
    }

    fn dirty(&self, prepared: &Prepared) -> Result<bool> {
        if self.output.is_dirty(prepared.expected(), &prepared.identity)? {
            return Ok(true);
        }
        let ctx = context(&self.name, &self.gather, &prepared.identity, prepared.started);
        for stage in &self.stages {
            if stage.is_dirty(&ctx)? {
                debug!(pipeline = %self.name, stage = stage.kind(), "stage reports dirty");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Execute the chain if dirty.
    pub fn run(&mut self) -> Result<RunOutcome> {
        let prepared = self.prepare()?;
        if !self.dirty(&prepared)? {
            debug!(pipeline = %self.name, "clean");
            return Ok(RunOutcome::Clean);
        }
        self.execute(prepared).map(RunOutcome::Built)
    }

    /// Execute the chain regardless of dirty state.
    pub fn force_run(&mut self) -> Result<RunOutcome> {
        let prepared = self.prepare()?;
        self.execute(prepared).map(RunOutcome::Built)
    }

    fn execute(&mut self, prepared: Prepared) -> Result<CommitReport> {
        let timer = Instant::now();
        info!(pipeline = %self.name, fingerprint = %prepared.identity.fingerprint, "running");

        let ctx = context(&self.name, &self.gather, &prepared.identity, prepared.started);
        let mut artifacts = self.gather.execute()?;
        check_prediction("gather", &prepared.predictions[0], &artifacts.names())?;

        for (i, stage) in self.stages.iter().enumerate() {
            let stage_timer = Instant::now();
            artifacts = stage.execute(&ctx, artifacts)?;
            check_prediction(stage.kind(), &prepared.predictions[i + 1], &artifacts.names())?;
            debug!(
                pipeline = %self.name,
                stage = stage.kind(),
                artifacts = artifacts.len(),
                elapsed_ms = stage_timer.elapsed().as_millis() as u64,
                "stage finished"
            );
        }

        let report = self.output.commit(&artifacts, &prepared.identity)?;

        let ctx = context(&self.name, &self.gather, &prepared.identity, prepared.started);
        for stage in self.stages.iter_mut() {
            stage.on_commit(&ctx)?;
        }

        info!(
            pipeline = %self.name,
            written = report.written.len(),
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "built"
        );
        Ok(report)
    }

    /// Public URLs of the expected outputs, without running anything.
    pub fn output_urls(&self) -> Result<Vec<String>> {
        let prepared = self.prepare()?;
        Ok(prepared.expected().iter().map(|name| self.output.public_url(name)).collect())
    }

    /// Whether a request path (relative to the URL root) names one of this
    /// pipeline's outputs.
    pub fn resolves(&self, relative: &str) -> Result<bool> {
        let expected = self.expected_output_names()?;
        Ok(self.output.resolve_key(relative, &expected).is_some())
    }

    /// Fetch the stored artifact for a request path relative to the URL root.
    pub fn serve(&self, relative: &str) -> Result<Option<ServedAsset>> {
        let expected = self.expected_output_names()?;
        self.output.serve(relative, &expected)
    }

    /// Re-expand glob inputs.
    pub fn refresh_inputs(&mut self) -> Result<()> {
        self.gather.refresh()
    }

    /// Directories to watch for input changes.
    pub fn watch_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.gather.watch_dirs();
        for input in self.stages.iter().flat_map(|s| s.extra_inputs()) {
            let path = input.resolve(self.gather.root());
            let dir = path.parent().map_or_else(|| self.gather.root().to_path_buf(), Path::to_path_buf);
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }

    /// Whether a changed file could affect this pipeline.
    pub fn affected_by(&self, path: &Path) -> bool {
        if self.gather.matches(path) {
            return true;
        }
        let rel = path.strip_prefix(self.gather.root()).unwrap_or(path);
        self.stages
            .iter()
            .flat_map(|s| s.extra_inputs())
            .any(|input| Path::new(input.name()) == rel)
    }
}

fn check_prediction(stage: &str, predicted: &[String], produced: &[String]) -> Result<()> {
    if same_names(predicted, produced) {
        return Ok(());
    }
    Err(PipelineError::PredictionMismatch {
        stage: stage.to_string(),
        predicted: predicted.to_vec(),
        produced: produced.to_vec(),
    })
}
