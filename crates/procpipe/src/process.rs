// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process handle: child lifetime, stdio streams, exit-status retrieval.

use tracing::debug;

use procpipe_fd::Handle;

use crate::backend::{self, Spawned};
use crate::builder::ProcessBuilder;
use crate::error::Error;
use crate::stream::{PipeReader, PipeWriter};

/// A running or terminated child process and its stdio pipe ends.
///
/// The handle exclusively owns the child slot and both pipe ends; nothing
/// is shared between handles. Stream operations and
/// [`wait_for`](Process::wait_for) block the calling thread — a caller
/// that must keep writing while the child floods its output (or the
/// other way round) drives the two streams from separate threads via
/// [`take_stdin`](Process::take_stdin)/[`take_stdout`](Process::take_stdout),
/// otherwise both pipe buffers can fill and deadlock. The handle never
/// multiplexes internally.
///
/// Call `wait_for` for deterministic cleanup. Dropping an unwaited
/// handle closes both streams and makes one non-blocking reap attempt,
/// but does not block on a still-running child.
#[derive(Debug)]
pub struct Process {
    child: backend::Child,
    stdin: PipeWriter,
    stdout: PipeReader,
    exit_code: Option<i32>,
}

impl Process {
    /// Launch `command` with default plumbing: piped stdin and stdout,
    /// stderr left on the parent, inherited environment.
    ///
    /// Equivalent to `Process::builder().command(command).start()`.
    pub fn exec(command: impl Into<String>) -> Result<Self, Error> {
        ProcessBuilder::new().command(command).start()
    }

    /// Start building a customized launch.
    pub fn builder() -> ProcessBuilder {
        ProcessBuilder::new()
    }

    pub(crate) fn from_spawned(spawned: Spawned) -> Self {
        let Spawned {
            child,
            stdin,
            stdout,
        } = spawned;
        Self {
            child,
            stdin: PipeWriter::new(stdin),
            // A redirected launch has no stdout pipe; the stream then
            // reports end-of-stream from the first read.
            stdout: PipeReader::new(stdout.unwrap_or_else(Handle::invalid)),
            exit_code: None,
        }
    }

    /// Platform identifier of the child.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Writable line-buffered stream over the child's stdin.
    ///
    /// Closing it (or dropping the handle) signals end-of-input to the
    /// child. Writing after the child closed its read end or exited
    /// fails with [`std::io::ErrorKind::BrokenPipe`]; the handle stays
    /// usable and `wait_for` may still be called.
    pub fn stdin(&mut self) -> &mut PipeWriter {
        &mut self.stdin
    }

    /// Readable stream over the child's stdout, carrying stderr too when
    /// the launch merged outputs.
    ///
    /// Reads block until data arrives or the child exits and the buffer
    /// drains, after which the stream reports end-of-stream. When stdout
    /// was redirected at launch this stream is empty from the start.
    pub fn stdout(&mut self) -> &mut PipeReader {
        &mut self.stdout
    }

    /// Take ownership of the stdin stream, e.g. to drive it from a
    /// writer thread. The handle keeps a closed stand-in; a second take
    /// returns that stand-in.
    pub fn take_stdin(&mut self) -> PipeWriter {
        std::mem::replace(&mut self.stdin, PipeWriter::new(Handle::invalid()))
    }

    /// Take ownership of the stdout stream, e.g. to drain it from a
    /// reader thread. The handle keeps an at-end-of-stream stand-in.
    pub fn take_stdout(&mut self) -> PipeReader {
        std::mem::replace(&mut self.stdout, PipeReader::new(Handle::invalid()))
    }

    /// Cached exit code, if the child has already been reaped.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Block until the child terminates and return its exit code.
    ///
    /// Buffered input is flushed first (a broken pipe at that point is
    /// ignored — the child may legitimately be gone already). The child
    /// is reaped exactly once; repeated calls return the cached code
    /// without blocking. A signal-killed child reports `128 + signal`;
    /// on Windows the process exit code is reported verbatim.
    ///
    /// The wait never drains the output pipe. A child producing more
    /// output than the pipe holds blocks until somebody reads, so drain
    /// [`stdout`](Process::stdout) concurrently in that case.
    pub fn wait_for(&mut self) -> Result<i32, Error> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        let _ = self.stdin.flush();
        let code = self.child.wait().map_err(|source| Error::Wait {
            pid: self.child.id(),
            source,
        })?;
        self.exit_code = Some(code);
        Ok(code)
    }

    /// Non-blocking poll: `Ok(Some(code))` once the child has
    /// terminated. Reaps at most once; the result is cached exactly like
    /// [`wait_for`](Process::wait_for).
    pub fn try_wait(&mut self) -> Result<Option<i32>, Error> {
        if let Some(code) = self.exit_code {
            return Ok(Some(code));
        }
        let polled = self.child.try_wait().map_err(|source| Error::Wait {
            pid: self.child.id(),
            source,
        })?;
        if let Some(code) = polled {
            self.exit_code = Some(code);
        }
        Ok(polled)
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if self.exit_code.is_some() {
            return;
        }
        // Release our pipe ends first so a child blocked on stdin sees
        // end-of-input.
        let _ = self.stdin.close();
        self.stdout.close();
        match self.child.try_wait() {
            Ok(Some(code)) => {
                self.exit_code = Some(code);
            }
            Ok(None) => {
                debug!(
                    target: "procpipe",
                    pid = self.child.id(),
                    "dropping handle to a still-running child"
                );
            }
            Err(err) => {
                debug!(
                    target: "procpipe",
                    pid = self.child.id(),
                    "drop-time reap failed: {err}"
                );
            }
        }
    }
}
