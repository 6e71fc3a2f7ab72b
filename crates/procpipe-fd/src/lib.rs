// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! procpipe-fd
#![warn(missing_docs)]

use std::fmt;
use std::io;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as imp;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as imp;

pub use imp::{INVALID_HANDLE, RawHandle};

/// Read up to `buf.len()` bytes from `handle`.
///
/// Returns `Ok(0)` at end-of-stream and for closed/invalid handles.
/// Interrupted calls are retried; other failures surface as `io::Error`.
pub fn read(handle: RawHandle, buf: &mut [u8]) -> io::Result<usize> {
    imp::read(handle, buf)
}

/// Write up to `buf.len()` bytes to `handle`, returning how many were
/// accepted.
///
/// Returns `Ok(0)` for closed/invalid handles. A pipe whose read end is
/// gone fails with [`io::ErrorKind::BrokenPipe`].
pub fn write(handle: RawHandle, buf: &[u8]) -> io::Result<usize> {
    imp::write(handle, buf)
}

/// Owned descriptor with scoped release: closed exactly once, either by
/// [`close`](Handle::close) or on drop.
pub struct Handle {
    raw: RawHandle,
}

impl Handle {
    /// Take ownership of `raw`. The handle will be closed when this value
    /// is dropped.
    pub fn from_raw(raw: RawHandle) -> Self {
        Self { raw }
    }

    /// A handle that owns nothing; every read reports end-of-stream and
    /// every write accepts zero bytes.
    pub fn invalid() -> Self {
        Self {
            raw: INVALID_HANDLE,
        }
    }

    /// Whether this handle still owns an open descriptor.
    pub fn is_valid(&self) -> bool {
        self.raw != INVALID_HANDLE
    }

    /// The underlying raw descriptor. Ownership stays with `self`.
    pub fn as_raw(&self) -> RawHandle {
        self.raw
    }

    /// Give up ownership without closing. The caller becomes responsible
    /// for releasing the descriptor.
    pub fn into_raw(self) -> RawHandle {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }

    /// Read into `buf`; see the module-level [`read`].
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        read(self.raw, buf)
    }

    /// Write from `buf`; see the module-level [`write`].
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        write(self.raw, buf)
    }

    /// Release the descriptor. Calling this again (or dropping afterwards)
    /// is a no-op.
    pub fn close(&mut self) {
        if self.is_valid() {
            imp::close(self.raw);
            self.raw = INVALID_HANDLE;
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.raw).finish()
    }
}

// Win32 pipe handles are plain kernel object references; moving one to
// another thread is sound. (On Unix, RawHandle is an integer and these
// impls are automatic.)
#[cfg(windows)]
unsafe impl Send for Handle {}
#[cfg(windows)]
unsafe impl Sync for Handle {}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[cfg(unix)]
    fn raw(file: std::fs::File) -> RawHandle {
        use std::os::unix::io::IntoRawFd;
        file.into_raw_fd()
    }

    #[cfg(windows)]
    fn raw(file: std::fs::File) -> RawHandle {
        use std::os::windows::io::IntoRawHandle;
        file.into_raw_handle()
    }

    #[test]
    fn read_on_invalid_handle_returns_zero() {
        let mut buf = [0u8; 16];
        assert_eq!(read(INVALID_HANDLE, &mut buf).unwrap(), 0);
    }

    #[test]
    fn write_on_invalid_handle_returns_zero() {
        assert_eq!(write(INVALID_HANDLE, b"dropped").unwrap(), 0);
    }

    #[test]
    fn close_is_idempotent() {
        let mut handle = Handle::invalid();
        handle.close();
        handle.close();
        assert!(!handle.is_valid());
    }

    #[test]
    fn file_round_trip() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let writer = Handle::from_raw(raw(tmp.reopen().unwrap()));
        let mut written = 0;
        while written < 5 {
            let n = writer.write(&b"hello"[written..]).unwrap();
            assert!(n > 0);
            written += n;
        }
        drop(writer);

        let reader = Handle::from_raw(raw(tmp.reopen().unwrap()));
        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(reader.read(&mut buf[n..]).unwrap(), 0);
    }

    #[test]
    fn reads_after_close_report_end_of_stream() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"payload").unwrap();
        let mut handle = Handle::from_raw(raw(tmp.reopen().unwrap()));
        handle.close();
        let mut buf = [0u8; 8];
        assert_eq!(handle.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn into_raw_releases_ownership() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let fd = raw(tmp.reopen().unwrap());
        let handle = Handle::from_raw(fd);
        assert_eq!(handle.into_raw(), fd);
        // We took ownership back; release it ourselves.
        let mut cleanup = Handle::from_raw(fd);
        cleanup.close();
    }
}
