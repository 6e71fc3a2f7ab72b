// SPDX-License-Identifier: MIT OR Apache-2.0
//! Platform process backends, selected at build time.
//!
//! One interface, two implementations: POSIX fork/exec and Win32
//! CreateProcess. The rest of the crate sees only [`Spawned`] and
//! `Child`; no platform type crosses this boundary.

use procpipe_fd::Handle;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use unix::{Child, spawn};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use windows::{Child, spawn};

/// Raw result of a successful spawn: the exclusively-owned child slot
/// plus the parent-side pipe ends.
pub(crate) struct Spawned {
    pub child: Child,
    pub stdin: Handle,
    /// Absent when stdout was redirected to a caller-supplied descriptor.
    pub stdout: Option<Handle>,
}
