// SPDX-License-Identifier: MIT OR Apache-2.0
//! Win32 descriptor primitives.

use std::io;
use std::ptr;

use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_BROKEN_PIPE, ERROR_INVALID_HANDLE, HANDLE,
};
use windows_sys::Win32::Storage::FileSystem::{ReadFile, WriteFile};

/// Platform descriptor type: a Win32 `HANDLE`.
pub type RawHandle = HANDLE;

/// Sentinel for a closed or never-opened handle.
pub const INVALID_HANDLE: RawHandle = ptr::null_mut();

pub(crate) fn read(handle: RawHandle, buf: &mut [u8]) -> io::Result<usize> {
    if handle == INVALID_HANDLE {
        return Ok(0);
    }
    let len = buf.len().min(u32::MAX as usize) as u32;
    let mut got: u32 = 0;
    let ok = unsafe { ReadFile(handle, buf.as_mut_ptr(), len, &mut got, ptr::null_mut()) };
    if ok != 0 {
        return Ok(got as usize);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        // A pipe whose write end went away reads as ordinary end-of-stream.
        Some(code) if code as u32 == ERROR_BROKEN_PIPE => Ok(0),
        Some(code) if code as u32 == ERROR_INVALID_HANDLE => Ok(0),
        _ => Err(err),
    }
}

pub(crate) fn write(handle: RawHandle, buf: &[u8]) -> io::Result<usize> {
    if handle == INVALID_HANDLE {
        return Ok(0);
    }
    let len = buf.len().min(u32::MAX as usize) as u32;
    let mut put: u32 = 0;
    let ok = unsafe { WriteFile(handle, buf.as_ptr(), len, &mut put, ptr::null_mut()) };
    if ok != 0 {
        return Ok(put as usize);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(code) if code as u32 == ERROR_INVALID_HANDLE => Ok(0),
        _ => Err(err),
    }
}

pub(crate) fn close(handle: RawHandle) {
    unsafe {
        CloseHandle(handle);
    }
}
