// SPDX-License-Identifier: MIT OR Apache-2.0
//! POSIX descriptor primitives.

use std::io;

/// Platform descriptor type: a POSIX file descriptor.
pub type RawHandle = libc::c_int;

/// Sentinel for a closed or never-opened handle.
pub const INVALID_HANDLE: RawHandle = -1;

pub(crate) fn read(handle: RawHandle, buf: &mut [u8]) -> io::Result<usize> {
    if handle == INVALID_HANDLE {
        return Ok(0);
    }
    loop {
        let n = unsafe { libc::read(handle, buf.as_mut_ptr().cast(), buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EBADF) => return Ok(0),
            _ => return Err(err),
        }
    }
}

pub(crate) fn write(handle: RawHandle, buf: &[u8]) -> io::Result<usize> {
    if handle == INVALID_HANDLE {
        return Ok(0);
    }
    loop {
        let n = unsafe { libc::write(handle, buf.as_ptr().cast(), buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EBADF) => return Ok(0),
            _ => return Err(err),
        }
    }
}

pub(crate) fn close(handle: RawHandle) {
    unsafe {
        libc::close(handle);
    }
}
