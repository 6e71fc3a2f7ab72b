// SPDX-License-Identifier: MIT OR Apache-2.0
//! Launch configuration types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use procpipe_fd::RawHandle;

use crate::error::Error;

/// Immutable description of a child process to launch.
///
/// Built by [`ProcessBuilder`](crate::ProcessBuilder), validated and
/// consumed exactly once by the platform backend, then discarded.
/// Environment overrides merge with the parent's environment: keys not
/// listed here are inherited unchanged.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Executable path or name.
    pub command: String,
    /// Arguments passed to the command (argv minus the program name).
    pub args: Vec<String>,
    /// Environment variables added to or replacing the inherited set.
    pub env: BTreeMap<String, String>,
    /// Optional working directory override.
    pub cwd: Option<PathBuf>,
    /// When set, the child's stdout is connected to this descriptor
    /// instead of a pipe. The descriptor is borrowed for the spawn only;
    /// the caller keeps ownership and closes it itself.
    pub stdout_redirect: Option<RawHandle>,
    /// Route the child's stderr to the same destination as its stdout
    /// (the pipe, or the redirect target). Fixed at spawn time.
    pub merge_outputs: bool,
}

impl LaunchSpec {
    /// Create a spec for `command` with defaults everywhere else: no
    /// arguments, inherited environment, piped stdout, stderr untouched.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            stdout_redirect: None,
            merge_outputs: false,
        }
    }

    /// Check the launch invariants without touching any OS resource.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.command.is_empty() {
            return Err(Error::MissingCommand);
        }
        if self.command.contains('\0') {
            return Err(Error::InvalidConfig(
                "command contains an interior NUL".into(),
            ));
        }
        for (index, arg) in self.args.iter().enumerate() {
            if arg.contains('\0') {
                return Err(Error::InvalidConfig(format!(
                    "argument {index} contains an interior NUL"
                )));
            }
        }
        for (key, value) in &self.env {
            if key.is_empty() {
                return Err(Error::InvalidConfig("environment key is empty".into()));
            }
            if key.contains('=') || key.contains('\0') {
                return Err(Error::InvalidConfig(format!(
                    "environment key `{key}` contains a separator"
                )));
            }
            if value.contains('\0') {
                return Err(Error::InvalidConfig(format!(
                    "environment value for `{key}` contains an interior NUL"
                )));
            }
        }
        if let Some(cwd) = &self.cwd {
            if cwd.as_os_str().as_encoded_bytes().contains(&0) {
                return Err(Error::InvalidConfig(
                    "working directory contains an interior NUL".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_pipes_everywhere() {
        let spec = LaunchSpec::new("sh");
        assert!(spec.args.is_empty());
        assert!(spec.env.is_empty());
        assert!(spec.cwd.is_none());
        assert!(spec.stdout_redirect.is_none());
        assert!(!spec.merge_outputs);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn empty_command_is_rejected() {
        let spec = LaunchSpec::new("");
        assert!(matches!(spec.validate(), Err(Error::MissingCommand)));
    }

    #[test]
    fn env_key_with_equals_is_rejected() {
        let mut spec = LaunchSpec::new("sh");
        spec.env.insert("BAD=KEY".into(), "value".into());
        assert!(matches!(spec.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn interior_nul_in_argument_is_rejected() {
        let mut spec = LaunchSpec::new("sh");
        spec.args.push("oops\0oops".into());
        assert!(matches!(spec.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn interior_nul_in_env_value_is_rejected() {
        let mut spec = LaunchSpec::new("sh");
        spec.env.insert("KEY".into(), "va\0lue".into());
        assert!(matches!(spec.validate(), Err(Error::InvalidConfig(_))));
    }
}
