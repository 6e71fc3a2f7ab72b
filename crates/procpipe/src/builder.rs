// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fluent construction of a child-process launch.

use std::path::PathBuf;

use procpipe_fd::RawHandle;

use crate::backend;
use crate::error::Error;
use crate::process::Process;
use crate::spec::LaunchSpec;

/// Fluent builder for launching a child process.
///
/// Setters only record values; nothing is validated and no OS resource
/// is touched until [`start`](ProcessBuilder::start).
///
/// ```no_run
/// use procpipe::ProcessBuilder;
///
/// let mut p = ProcessBuilder::new()
///     .command("/bin/sh")
///     .environment("GREETING", "hello")
///     .merge_outputs(true)
///     .start()?;
/// p.stdin().write_line("echo $GREETING")?;
/// p.stdin().write_line("exit")?;
/// assert_eq!(p.wait_for()?, 0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct ProcessBuilder {
    command: Option<String>,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    stdout_redirect: Option<RawHandle>,
    merge_outputs: bool,
}

impl ProcessBuilder {
    /// An empty builder; [`start`](ProcessBuilder::start) fails until a
    /// command is set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the executable path or name.
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Append a batch of arguments.
    pub fn arguments<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Override one environment variable for the child. Repeating a key
    /// replaces the earlier value; keys never mentioned are inherited
    /// from the parent unchanged.
    pub fn environment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run the child in `dir` instead of the parent's working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Connect the child's stdout directly to `target` instead of a pipe.
    ///
    /// The descriptor is borrowed for the spawn only; the caller keeps
    /// ownership. With a redirect in place the handle's output stream is
    /// at end-of-stream from the start.
    pub fn redirect_stdout(mut self, target: RawHandle) -> Self {
        self.stdout_redirect = Some(target);
        self
    }

    /// Route the child's stderr to the same destination as its stdout.
    /// Off by default (stderr stays on the parent's stderr).
    pub fn merge_outputs(mut self, merge: bool) -> Self {
        self.merge_outputs = merge;
        self
    }

    /// Validate the configuration, spawn the child, and wrap it in a
    /// [`Process`].
    pub fn start(self) -> Result<Process, Error> {
        let spec = self.into_spec()?;
        spec.validate()?;
        let spawned = backend::spawn(&spec)?;
        Ok(Process::from_spawned(spawned))
    }

    fn into_spec(self) -> Result<LaunchSpec, Error> {
        let command = self.command.ok_or(Error::MissingCommand)?;
        let mut spec = LaunchSpec::new(command);
        spec.args = self.args;
        for (key, value) in self.env {
            spec.env.insert(key, value);
        }
        spec.cwd = self.cwd;
        spec.stdout_redirect = self.stdout_redirect;
        spec.merge_outputs = self.merge_outputs;
        Ok(spec)
    }
}
