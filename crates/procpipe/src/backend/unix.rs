// SPDX-License-Identifier: MIT OR Apache-2.0
//! POSIX backend: fork + execvp with pipe plumbing and a CLOEXEC
//! exec-error channel.
//!
//! The error channel turns a failed image replacement (binary not
//! found, permission denied) into a synchronous [`Error::Exec`] from
//! the spawn instead of a deferred bogus exit code: the child writes
//! the raw errno into a CLOEXEC pipe and `_exit(127)`s; a successful
//! exec closes the pipe and the parent reads end-of-stream.

use std::collections::BTreeMap;
use std::ffi::CString;
use std::io;
use std::os::unix::ffi::{OsStrExt, OsStringExt};

use procpipe_fd::{Handle, RawHandle};
use tracing::debug;

use crate::backend::Spawned;
use crate::error::Error;
use crate::spec::LaunchSpec;

unsafe extern "C" {
    #[allow(non_upper_case_globals)]
    static mut environ: *const *const libc::c_char;
}

/// Exclusively-owned child slot: a reapable POSIX pid.
#[derive(Debug)]
pub(crate) struct Child {
    pid: libc::pid_t,
}

impl Child {
    pub(crate) fn id(&self) -> u32 {
        self.pid as u32
    }

    /// Block in `waitpid` until the child terminates, retrying over
    /// interrupted calls.
    pub(crate) fn wait(&self) -> io::Result<i32> {
        let mut status: libc::c_int = 0;
        loop {
            let rc = unsafe { libc::waitpid(self.pid, &mut status, 0) };
            if rc == self.pid {
                return Ok(decode_status(status));
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// `waitpid` with `WNOHANG`; `None` while the child is still running.
    pub(crate) fn try_wait(&self) -> io::Result<Option<i32>> {
        let mut status: libc::c_int = 0;
        loop {
            let rc = unsafe { libc::waitpid(self.pid, &mut status, libc::WNOHANG) };
            if rc == 0 {
                return Ok(None);
            }
            if rc == self.pid {
                return Ok(Some(decode_status(status)));
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

/// Normal exit maps to the exit status, signal death to `128 + signo`.
fn decode_status(status: libc::c_int) -> i32 {
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        128 + libc::WTERMSIG(status)
    } else {
        // Stop/continue reports cannot surface from a plain wait.
        128
    }
}

pub(crate) fn spawn(spec: &LaunchSpec) -> Result<Spawned, Error> {
    // Everything the child touches is converted before the fork; the
    // child itself performs no allocation.
    let program = cstring(&spec.command)?;
    let mut argv_storage = Vec::with_capacity(spec.args.len() + 1);
    argv_storage.push(program.clone());
    for arg in &spec.args {
        argv_storage.push(cstring(arg)?);
    }
    let mut argv: Vec<*const libc::c_char> = argv_storage.iter().map(|a| a.as_ptr()).collect();
    argv.push(std::ptr::null());

    // With overrides present the whole merged environment is materialized
    // up front; the child then only stores a pointer. Without overrides
    // the child inherits `environ` untouched.
    let env_block = match spec.env.is_empty() {
        true => None,
        false => Some(merged_env_block(&spec.env)?),
    };
    let envp: Option<Vec<*const libc::c_char>> = env_block.as_ref().map(|block| {
        let mut ptrs: Vec<*const libc::c_char> = block.iter().map(|e| e.as_ptr()).collect();
        ptrs.push(std::ptr::null());
        ptrs
    });

    let cwd = match &spec.cwd {
        Some(dir) => Some(CString::new(dir.as_os_str().as_bytes()).map_err(|_| {
            Error::InvalidConfig("working directory contains an interior NUL".into())
        })?),
        None => None,
    };

    let (stdin_read, stdin_write) = pipe_pair().map_err(Error::Pipe)?;
    let (stdout_read, stdout_write, stdout_target) = match spec.stdout_redirect {
        Some(target) => (None, None, target),
        None => {
            let (read, write) = pipe_pair().map_err(Error::Pipe)?;
            let target = write.as_raw();
            (Some(read), Some(write), target)
        }
    };
    let (exec_read, exec_write) = pipe_pair().map_err(Error::Pipe)?;

    debug!(
        target: "procpipe",
        command = %spec.command,
        args = ?spec.args,
        merge_outputs = spec.merge_outputs,
        "spawning child"
    );

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(Error::Spawn {
            command: spec.command.clone(),
            source: io::Error::last_os_error(),
        });
    }

    if pid == 0 {
        exec_child(
            &program,
            &argv,
            envp.as_deref(),
            cwd.as_ref(),
            stdin_read.as_raw(),
            stdout_target,
            spec.merge_outputs,
            exec_write.as_raw(),
        );
    }

    // Parent: the child-side ends are the child's problem now.
    drop(stdin_read);
    drop(stdout_write);
    drop(exec_write);

    if let Some(errno) = read_exec_errno(&exec_read) {
        // The child is already on its way to _exit(127); reap it so the
        // failed attempt leaves nothing behind.
        let child = Child { pid };
        let _ = child.wait();
        return Err(Error::Exec {
            command: spec.command.clone(),
            source: io::Error::from_raw_os_error(errno),
        });
    }

    Ok(Spawned {
        child: Child { pid },
        stdin: stdin_write,
        stdout: stdout_read,
    })
}

/// Child-side setup after the fork: descriptor wiring, environment
/// pointer swap, exec. Everything here is async-signal-safe — the
/// parent may have other threads mid-allocation at fork time. Never
/// returns.
#[allow(clippy::too_many_arguments)]
fn exec_child(
    program: &CString,
    argv: &[*const libc::c_char],
    envp: Option<&[*const libc::c_char]>,
    cwd: Option<&CString>,
    stdin_fd: RawHandle,
    stdout_fd: RawHandle,
    merge_outputs: bool,
    report_fd: RawHandle,
) -> ! {
    unsafe {
        if libc::dup2(stdin_fd, 0) < 0 {
            report_and_exit(report_fd);
        }
        if libc::dup2(stdout_fd, 1) < 0 {
            report_and_exit(report_fd);
        }
        if merge_outputs && libc::dup2(1, 2) < 0 {
            report_and_exit(report_fd);
        }
        if let Some(envp) = envp {
            environ = envp.as_ptr();
        }
        if let Some(dir) = cwd {
            if libc::chdir(dir.as_ptr()) < 0 {
                report_and_exit(report_fd);
            }
        }
        // The Rust runtime ignores SIGPIPE in the parent; the child gets
        // the default disposition back.
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        // All our pipe descriptors carry CLOEXEC; a successful exec
        // closes them, including the report channel.
        libc::execvp(program.as_ptr(), argv.as_ptr());
        report_and_exit(report_fd);
    }
}

fn report_and_exit(report_fd: RawHandle) -> ! {
    let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
    let bytes = errno.to_ne_bytes();
    unsafe {
        libc::write(report_fd, bytes.as_ptr().cast(), bytes.len());
        libc::_exit(127);
    }
}

/// Block until the exec-error pipe reports. End-of-stream means the
/// exec succeeded; four bytes carry the child's errno.
fn read_exec_errno(pipe: &Handle) -> Option<i32> {
    let mut bytes = [0u8; 4];
    let mut got = 0;
    while got < bytes.len() {
        match pipe.read(&mut bytes[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(_) => break,
        }
    }
    (got == bytes.len()).then(|| i32::from_ne_bytes(bytes))
}

/// Parent environment plus overrides as `KEY=VALUE` strings, ready to
/// become the child's `environ`. Overridden keys drop their inherited
/// entry; everything else passes through byte-for-byte.
fn merged_env_block(overrides: &BTreeMap<String, String>) -> Result<Vec<CString>, Error> {
    let mut entries = Vec::new();
    for (key, value) in std::env::vars_os() {
        if overrides.keys().any(|k| k.as_bytes() == key.as_encoded_bytes()) {
            continue;
        }
        let mut bytes = key.into_vec();
        bytes.push(b'=');
        bytes.extend(value.into_vec());
        if let Ok(entry) = CString::new(bytes) {
            entries.push(entry);
        }
    }
    for (key, value) in overrides {
        entries.push(cstring(&format!("{key}={value}"))?);
    }
    Ok(entries)
}

fn pipe_pair() -> io::Result<(Handle, Handle)> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    let read = Handle::from_raw(fds[0]);
    let write = Handle::from_raw(fds[1]);
    set_cloexec(read.as_raw())?;
    set_cloexec(write.as_raw())?;
    Ok((read, write))
}

fn set_cloexec(fd: RawHandle) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn cstring(s: &str) -> Result<CString, Error> {
    CString::new(s)
        .map_err(|_| Error::InvalidConfig("string contains an interior NUL".into()))
}
