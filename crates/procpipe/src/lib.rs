// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! procpipe
#![warn(missing_docs)]
//!
//! The pieces fit together as a short pipeline: [`ProcessBuilder`]
//! accumulates a [`LaunchSpec`]; the platform backend (fork/exec on
//! POSIX, CreateProcess on Windows — selected at build time, never
//! visible in the API) turns it into a child plus raw pipe ends; and
//! [`Process`] owns the child for its lifetime, exposing the pipe ends
//! as the line-buffered [`PipeWriter`] and [`PipeReader`] adapters.

mod backend;
pub mod builder;
pub mod error;
pub mod process;
pub mod spec;
pub mod stream;

pub use builder::ProcessBuilder;
pub use error::Error;
pub use process::Process;
pub use procpipe_fd::{Handle, RawHandle};
pub use spec::LaunchSpec;
pub use stream::{PipeReader, PipeWriter};
