//! External tool adapter.
//!
//! Compilers and minifiers are opaque command-line programs. A [`ToolCommand`]
//! describes how to invoke one: the program, an argument template, how
//! artifact content reaches the tool ([`InputChannel`]), what to do with
//! anything it writes to stderr ([`DiagnosticPolicy`]) and an optional
//! timeout. Standard output is always the produced content.
//!
//! Argument templates may use `{name}` (the artifact name) and `{ext}` (its
//! extension without the dot).

pub mod presets;

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::artifact::{extension_of, Artifact};
use crate::error::{PipelineError, Result};

/// How often a timed invocation checks whether the child has exited.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How artifact content is handed to the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputChannel {
    /// Content is written to the tool's stdin (concatenated for a group).
    #[default]
    Stdin,
    /// Content is written to temporary files whose paths are appended to argv.
    Arguments,
}

/// What to do when a tool writes to stderr but exits successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticPolicy {
    /// Any diagnostic output fails the run.
    Fail,
    /// Log diagnostics as warnings.
    #[default]
    Warn,
    /// Drop diagnostics.
    Ignore,
}

impl std::fmt::Display for DiagnosticPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticPolicy::Fail => write!(f, "fail"),
            DiagnosticPolicy::Warn => write!(f, "warn"),
            DiagnosticPolicy::Ignore => write!(f, "ignore"),
        }
    }
}

/// Invocation recipe for one external tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    name: String,
    program: Option<String>,
    args: Vec<String>,
    input: InputChannel,
    diagnostics: DiagnosticPolicy,
    timeout: Option<Duration>,
    setting: String,
}

impl ToolCommand {
    /// Create a command for `program`, reading stdin and warning on diagnostics.
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            setting: format!("tools.{}", name),
            name,
            program: Some(program.into()),
            args: Vec::new(),
            input: InputChannel::Stdin,
            diagnostics: DiagnosticPolicy::Warn,
            timeout: None,
        }
    }

    /// A command whose program was never configured.
    ///
    /// Building the stage succeeds; running it fails with a configuration
    /// error naming `setting`.
    pub fn unconfigured(name: impl Into<String>, setting: impl Into<String>) -> Self {
        let mut command = Self::new(name, "");
        command.program = None;
        command.setting = setting.into();
        command
    }

    /// Set the argument template.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Append one templated argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the input channel.
    pub fn with_input(mut self, input: InputChannel) -> Self {
        self.input = input;
        self
    }

    /// Set the diagnostic policy.
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticPolicy) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Kill the tool and fail if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name of the setting that configures the program, used in error messages.
    pub fn with_setting(mut self, setting: impl Into<String>) -> Self {
        self.setting = setting.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> Option<&str> {
        self.program.as_deref()
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn input_channel(&self) -> InputChannel {
        self.input
    }

    pub fn diagnostics(&self) -> DiagnosticPolicy {
        self.diagnostics
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Expand the argument template for one artifact name.
    pub fn argv(&self, artifact_name: &str) -> Vec<String> {
        let ext = extension_of(artifact_name).unwrap_or("");
        self.args
            .iter()
            .map(|arg| arg.replace("{name}", artifact_name).replace("{ext}", ext))
            .collect()
    }

    /// Run the tool over `group` and return its standard output.
    ///
    /// Template placeholders refer to the first artifact of the group. With
    /// [`InputChannel::Stdin`] the group's content is concatenated onto stdin;
    /// with [`InputChannel::Arguments`] each artifact is written under its
    /// name into a temporary directory and the paths are appended to argv.
    pub fn run(&self, cwd: &Path, group: &[&Artifact]) -> Result<Vec<u8>> {
        let program = match self.program.as_deref() {
            Some(program) if !program.trim().is_empty() => program.trim(),
            _ => {
                return Err(PipelineError::configuration(format!(
                    "tool '{}' is not configured; set `{}`",
                    self.name, self.setting
                )))
            }
        };

        let first_name = group.first().map(|a| a.name()).unwrap_or("");
        let mut argv = self.argv(first_name);

        let (stdin, _scratch) = match self.input {
            InputChannel::Stdin => {
                let mut content = Vec::with_capacity(group.iter().map(|a| a.len()).sum());
                for artifact in group {
                    content.extend_from_slice(artifact.content());
                }
                (Some(content), None)
            }
            InputChannel::Arguments => {
                let (dir, paths) = self.materialize(group)?;
                argv.extend(paths.iter().map(|p| p.to_string_lossy().into_owned()));
                (None, Some(dir))
            }
        };

        debug!(tool = %self.name, program, args = ?argv, "invoking tool");
        let started = Instant::now();
        let result = self.invoke(program, &argv, cwd, stdin);
        debug!(tool = %self.name, elapsed_ms = started.elapsed().as_millis() as u64, "tool finished");
        result
    }

    /// Write `group` into a fresh temporary directory, keeping relative names.
    fn materialize(&self, group: &[&Artifact]) -> Result<(tempfile::TempDir, Vec<PathBuf>)> {
        let io_err = |e: std::io::Error| {
            PipelineError::tool(&self.name, format!("cannot stage input files: {}", e))
        };
        let dir = tempfile::TempDir::new().map_err(io_err)?;
        let mut paths = Vec::with_capacity(group.len());
        for artifact in group {
            let relative = artifact.name().trim_start_matches('/');
            let path = dir.path().join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
            std::fs::write(&path, artifact.content()).map_err(io_err)?;
            paths.push(path);
        }
        Ok((dir, paths))
    }

    fn invoke(&self, program: &str, argv: &[String], cwd: &Path, stdin: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let mut child = Command::new(program)
            .args(argv)
            .current_dir(cwd)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PipelineError::configuration(format!(
                    "tool '{}': executable '{}' not found; check `{}`",
                    self.name, program, self.setting
                )),
                _ => PipelineError::tool(&self.name, format!("failed to spawn '{}': {}", program, e)),
            })?;

        // Feed stdin and drain both pipes on separate threads so a tool that
        // fills its stdout buffer before reading all input cannot deadlock.
        let writer = match (stdin, child.stdin.take()) {
            (Some(bytes), Some(mut pipe)) => Some(thread::spawn(move || match pipe.write_all(&bytes) {
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            })),
            _ => None,
        };
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let status = self.wait(&mut child)?;

        if let Some(writer) = writer {
            join(writer, &self.name)?
                .map_err(|e| PipelineError::tool(&self.name, format!("writing stdin: {}", e)))?;
        }
        let stdout = match stdout {
            Some(reader) => join(reader, &self.name)?
                .map_err(|e| PipelineError::tool(&self.name, format!("reading stdout: {}", e)))?,
            None => Vec::new(),
        };
        let stderr = match stderr {
            Some(reader) => join(reader, &self.name)?.unwrap_or_default(),
            None => Vec::new(),
        };
        let diagnostics = String::from_utf8_lossy(&stderr).trim().to_string();

        if !status.success() {
            let mut message = format!("exited with {}", status);
            if !diagnostics.is_empty() {
                message.push_str(":\n");
                message.push_str(&diagnostics);
            }
            return Err(PipelineError::tool(&self.name, message));
        }

        if !diagnostics.is_empty() {
            match self.diagnostics {
                DiagnosticPolicy::Fail => {
                    return Err(PipelineError::tool(
                        &self.name,
                        format!("unexpected diagnostic output:\n{}", diagnostics),
                    ))
                }
                DiagnosticPolicy::Warn => warn!(tool = %self.name, "{}", diagnostics),
                DiagnosticPolicy::Ignore => debug!(tool = %self.name, "ignored diagnostics: {}", diagnostics),
            }
        }

        Ok(stdout)
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        let wait_err = |e: std::io::Error| PipelineError::tool(&self.name, format!("wait failed: {}", e));

        let Some(limit) = self.timeout else {
            return child.wait().map_err(wait_err);
        };

        let deadline = Instant::now() + limit;
        loop {
            match child.try_wait().map_err(wait_err)? {
                Some(status) => return Ok(status),
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(PipelineError::tool(
                        &self.name,
                        format!("timed out after {:.1}s and was killed", limit.as_secs_f64()),
                    ));
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join<T>(handle: JoinHandle<T>, tool: &str) -> Result<T> {
    handle.join().map_err(|_| PipelineError::tool(tool, "I/O thread panicked"))
}
