//! How a worker script is launched.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

/// Launch recipe shared by one-shot and streaming workers.
///
/// A worker is started as `<interpreter> <interpreter_args..> <script> <args..>`
/// with its working directory set to `scripts_dir`, so `script` is resolved
/// relative to that directory.
///
/// # Example
///
/// ```rust
/// use jarules_worker_sdk::WorkerCommand;
///
/// let command = WorkerCommand::new("python3")
///     .with_interpreter_args(["-u"])
///     .with_scripts_dir("jarules_agent/electron_bridge");
///
/// assert_eq!(command.interpreter(), "python3");
/// ```
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    /// Program used to run scripts.
    interpreter: String,

    /// Arguments placed before the script name (e.g. `-u` for unbuffered output).
    interpreter_args: Vec<String>,

    /// Directory holding the scripts; also the working directory.
    scripts_dir: PathBuf,

    /// Additional environment variables.
    env_vars: Vec<(String, String)>,
}

impl WorkerCommand {
    /// Create a launch recipe for the given interpreter.
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            interpreter_args: Vec::new(),
            scripts_dir: PathBuf::from("."),
            env_vars: Vec::new(),
        }
    }

    /// Set the arguments placed before the script name.
    pub fn with_interpreter_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interpreter_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the scripts directory.
    pub fn with_scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scripts_dir = dir.into();
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Build the tokio command for `script` with positional `args`.
    ///
    /// stdin is closed; stdout and stderr are piped.
    pub(crate) fn build(&self, script: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.interpreter_args)
            .arg(script)
            .args(args)
            .current_dir(&self.scripts_dir)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        cmd
    }
}

impl Default for WorkerCommand {
    fn default() -> Self {
        Self::new("python3").with_interpreter_args(["-u"])
    }
}
