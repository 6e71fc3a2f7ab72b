// SPDX-License-Identifier: MIT OR Apache-2.0
//! Win32 backend: anonymous pipes + CreateProcessW.
//!
//! The three standard streams are routed through a `STARTUPINFOW`
//! inheritance table; only the child-side pipe ends stay inheritable.
//! Arguments are joined with the canonical `CommandLineToArgvW` quoting
//! rules, and environment overrides are merged into a sorted UTF-16
//! block.

use std::collections::BTreeMap;
use std::ffi::c_void;
use std::io;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use procpipe_fd::{Handle, RawHandle};
use tracing::debug;
use windows_sys::Win32::Foundation::{
    HANDLE, HANDLE_FLAG_INHERIT, SetHandleInformation, TRUE, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::Security::SECURITY_ATTRIBUTES;
use windows_sys::Win32::System::Console::{GetStdHandle, STD_ERROR_HANDLE};
use windows_sys::Win32::System::Pipes::CreatePipe;
use windows_sys::Win32::System::Threading::{
    CREATE_UNICODE_ENVIRONMENT, CreateProcessW, GetExitCodeProcess, INFINITE,
    PROCESS_INFORMATION, STARTF_USESTDHANDLES, STARTUPINFOW, WaitForSingleObject,
};

use crate::backend::Spawned;
use crate::error::Error;
use crate::spec::LaunchSpec;

/// Exclusively-owned child slot: the process handle plus its id.
#[derive(Debug)]
pub(crate) struct Child {
    process: Handle,
    id: u32,
}

impl Child {
    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    /// Block until the child terminates and report its exit code.
    pub(crate) fn wait(&self) -> io::Result<i32> {
        if unsafe { WaitForSingleObject(self.process.as_raw(), INFINITE) } != WAIT_OBJECT_0 {
            return Err(io::Error::last_os_error());
        }
        self.exit_code()
    }

    /// Zero-timeout wait; `None` while the child is still running.
    pub(crate) fn try_wait(&self) -> io::Result<Option<i32>> {
        match unsafe { WaitForSingleObject(self.process.as_raw(), 0) } {
            WAIT_OBJECT_0 => self.exit_code().map(Some),
            WAIT_TIMEOUT => Ok(None),
            _ => Err(io::Error::last_os_error()),
        }
    }

    fn exit_code(&self) -> io::Result<i32> {
        let mut code: u32 = 0;
        if unsafe { GetExitCodeProcess(self.process.as_raw(), &mut code) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(code as i32)
    }
}

pub(crate) fn spawn(spec: &LaunchSpec) -> Result<Spawned, Error> {
    let (stdin_read, stdin_write) = pipe_pair().map_err(Error::Pipe)?;
    let (stdout_read, stdout_write, stdout_target) = match spec.stdout_redirect {
        Some(target) => {
            // A caller-supplied descriptor must be inheritable for the
            // duration of the launch.
            set_inherit(target, true).map_err(Error::Pipe)?;
            (None, None, target)
        }
        None => {
            let (read, write) = pipe_pair().map_err(Error::Pipe)?;
            let target = write.as_raw();
            (Some(read), Some(write), target)
        }
    };

    // Only the child-side ends may cross into the child.
    set_inherit(stdin_write.as_raw(), false).map_err(Error::Pipe)?;
    if let Some(read) = &stdout_read {
        set_inherit(read.as_raw(), false).map_err(Error::Pipe)?;
    }

    let mut command_line = build_command_line(&spec.command, &spec.args);
    let env_block = build_environment_block(&spec.env);
    let cwd_wide = spec.cwd.as_deref().map(wide_path);

    let mut startup: STARTUPINFOW = unsafe { mem::zeroed() };
    startup.cb = mem::size_of::<STARTUPINFOW>() as u32;
    startup.dwFlags = STARTF_USESTDHANDLES;
    startup.hStdInput = stdin_read.as_raw();
    startup.hStdOutput = stdout_target;
    startup.hStdError = if spec.merge_outputs {
        stdout_target
    } else {
        unsafe { GetStdHandle(STD_ERROR_HANDLE) }
    };

    let env_ptr: *const c_void = match &env_block {
        Some(block) => block.as_ptr().cast(),
        None => ptr::null(),
    };
    let flags = if env_block.is_some() {
        CREATE_UNICODE_ENVIRONMENT
    } else {
        0
    };
    let cwd_ptr = match &cwd_wide {
        Some(wide) => wide.as_ptr(),
        None => ptr::null(),
    };

    debug!(
        target: "procpipe",
        command = %spec.command,
        args = ?spec.args,
        merge_outputs = spec.merge_outputs,
        "spawning child"
    );

    let mut info: PROCESS_INFORMATION = unsafe { mem::zeroed() };
    let created = unsafe {
        CreateProcessW(
            ptr::null(),
            command_line.as_mut_ptr(),
            ptr::null(),
            ptr::null(),
            TRUE,
            flags,
            env_ptr,
            cwd_ptr,
            &startup,
            &mut info,
        )
    };
    if created == 0 {
        return Err(Error::Spawn {
            command: spec.command.clone(),
            source: io::Error::last_os_error(),
        });
    }

    // The child owns its pipe ends now; release ours along with the
    // thread handle we never use.
    drop(Handle::from_raw(info.hThread));
    drop(stdin_read);
    drop(stdout_write);

    Ok(Spawned {
        child: Child {
            process: Handle::from_raw(info.hProcess),
            id: info.dwProcessId,
        },
        stdin: stdin_write,
        stdout: stdout_read,
    })
}

fn pipe_pair() -> io::Result<(Handle, Handle)> {
    let security = SECURITY_ATTRIBUTES {
        nLength: mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
        lpSecurityDescriptor: ptr::null_mut(),
        bInheritHandle: TRUE,
    };
    let mut read: HANDLE = ptr::null_mut();
    let mut write: HANDLE = ptr::null_mut();
    if unsafe { CreatePipe(&mut read, &mut write, &security, 0) } == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((Handle::from_raw(read), Handle::from_raw(write)))
}

fn set_inherit(handle: RawHandle, inherit: bool) -> io::Result<()> {
    let flags = if inherit { HANDLE_FLAG_INHERIT } else { 0 };
    if unsafe { SetHandleInformation(handle, HANDLE_FLAG_INHERIT, flags) } == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Join command and arguments into the single line `CreateProcessW`
/// expects, quoting with the `CommandLineToArgvW` rules so the child
/// parses back exactly the argv it was given.
fn build_command_line(command: &str, args: &[String]) -> Vec<u16> {
    let mut line = String::new();
    append_quoted(command, &mut line);
    for arg in args {
        line.push(' ');
        append_quoted(arg, &mut line);
    }
    let mut wide: Vec<u16> = line.encode_utf16().collect();
    wide.push(0);
    wide
}

fn append_quoted(arg: &str, line: &mut String) {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"']) {
        line.push_str(arg);
        return;
    }
    line.push('"');
    let chars: Vec<char> = arg.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let mut backslashes = 0;
        while i < chars.len() && chars[i] == '\\' {
            backslashes += 1;
            i += 1;
        }
        if i == chars.len() {
            // Trailing backslashes double up so the closing quote stays
            // a quote.
            for _ in 0..backslashes * 2 {
                line.push('\\');
            }
            break;
        }
        if chars[i] == '"' {
            for _ in 0..backslashes * 2 + 1 {
                line.push('\\');
            }
            line.push('"');
        } else {
            for _ in 0..backslashes {
                line.push('\\');
            }
            line.push(chars[i]);
        }
        i += 1;
    }
    line.push('"');
}

/// Merge the parent environment with the overrides into the sorted,
/// double-NUL-terminated UTF-16 block `CreateProcessW` expects. `None`
/// means inherit untouched.
fn build_environment_block(overrides: &BTreeMap<String, String>) -> Option<Vec<u16>> {
    if overrides.is_empty() {
        return None;
    }
    let mut merged: Vec<(String, String)> = std::env::vars()
        .filter(|(key, _)| !overrides.keys().any(|o| o.eq_ignore_ascii_case(key)))
        .collect();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.sort_by(|a, b| a.0.to_uppercase().cmp(&b.0.to_uppercase()));

    let mut block: Vec<u16> = Vec::new();
    for (key, value) in merged {
        block.extend(key.encode_utf16());
        block.push(u16::from(b'='));
        block.extend(value.encode_utf16());
        block.push(0);
    }
    block.push(0);
    Some(block)
}

fn wide_path(path: &Path) -> Vec<u16> {
    let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
    wide.push(0);
    wide
}
