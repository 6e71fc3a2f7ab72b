// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for configuring, spawning, and reaping child processes.
//!
//! Stream-level failures are deliberately *not* represented here:
//! [`PipeWriter`](crate::PipeWriter) and [`PipeReader`](crate::PipeReader)
//! speak `std::io`, so a write after the child closed its read end
//! surfaces as [`std::io::ErrorKind::BrokenPipe`] — a local write
//! failure that leaves the process handle fully usable.

use std::io;
use thiserror::Error;

/// Errors from building a launch configuration or driving a child.
#[derive(Debug, Error)]
pub enum Error {
    /// The builder was started without a command.
    #[error("no command configured")]
    MissingCommand,

    /// A configuration value violates a launch invariant.
    #[error("invalid launch configuration: {0}")]
    InvalidConfig(String),

    /// Creating a pipe for the child's standard streams failed.
    ///
    /// Raised before the child exists; nothing from the failed attempt
    /// stays open.
    #[error("failed to create pipe: {0}")]
    Pipe(#[source] io::Error),

    /// The OS refused to create the child process.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// The executable that was being launched.
        command: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The child was created but could not execute the target image.
    #[error("failed to execute `{command}`: {source}")]
    Exec {
        /// The executable that could not be executed.
        command: String,
        /// Underlying OS error, e.g. not found or permission denied.
        #[source]
        source: io::Error,
    },

    /// Waiting on the child failed at the OS level.
    #[error("failed to wait for child {pid}: {source}")]
    Wait {
        /// Platform identifier of the child.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}
