// SPDX-License-Identifier: MIT OR Apache-2.0
//! Buffered stream adapters over raw pipe descriptors.
//!
//! [`PipeWriter`] is line-buffered: bytes accumulate until a newline (or
//! an explicit flush) pushes them to the descriptor. [`PipeReader`]
//! buffers reads and layers line- and token-oriented extraction over the
//! `std::io` traits. Both own the descriptor they wrap and release it
//! exactly once — on explicit close or on drop.
//!
//! Either adapter also works over any other descriptor (a file opened by
//! the caller, say), which is how a redirect target gets read back.

use std::io::{self, BufRead, Read, Write};

use procpipe_fd::Handle;
use tracing::warn;

const READ_CHUNK: usize = 4096;

// ---------------------------------------------------------------------------
// PipeWriter
// ---------------------------------------------------------------------------

/// Line-buffered writable stream over an owned descriptor.
///
/// Writing to a pipe whose read end is gone (the child exited or closed
/// its stdin) fails with [`io::ErrorKind::BrokenPipe`]; the error is
/// local to the write and safe to ignore.
#[derive(Debug)]
pub struct PipeWriter {
    handle: Handle,
    buf: Vec<u8>,
}

impl PipeWriter {
    /// Wrap an owned descriptor.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            buf: Vec::new(),
        }
    }

    /// Append `line` plus a trailing newline and flush everything
    /// buffered so far.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.buf.extend_from_slice(line.as_bytes());
        self.buf.push(b'\n');
        self.flush()
    }

    /// Push every buffered byte down to the descriptor.
    pub fn flush(&mut self) -> io::Result<()> {
        let mut written = 0;
        while written < self.buf.len() {
            match self.handle.write(&self.buf[written..]) {
                Ok(0) => {
                    self.buf.drain(..written);
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "write on a closed descriptor",
                    ));
                }
                Ok(n) => written += n,
                Err(err) => {
                    self.buf.drain(..written);
                    return Err(err);
                }
            }
        }
        self.buf.clear();
        Ok(())
    }

    /// Flush what remains and release the descriptor. Closing an already
    /// closed stream is a no-op; the descriptor is never released twice.
    pub fn close(&mut self) -> io::Result<()> {
        let flushed = if self.handle.is_valid() {
            self.flush()
        } else {
            Ok(())
        };
        self.handle.close();
        flushed
    }

    /// Whether the underlying descriptor has been released.
    pub fn is_closed(&self) -> bool {
        !self.handle.is_valid()
    }
}

impl Write for PipeWriter {
    /// Buffer `data`, pushing everything through the last newline to the
    /// descriptor (line-buffered semantics). Bytes past the last newline
    /// stay buffered until the next newline or flush.
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if let Some(pos) = self.buf.iter().rposition(|&b| b == b'\n') {
            let tail = self.buf.split_off(pos + 1);
            let flushed = self.flush();
            // On error flush re-buffers what it could not push; the tail
            // goes back behind it either way.
            self.buf.extend_from_slice(&tail);
            flushed?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        PipeWriter::flush(self)
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if self.handle.is_valid() {
            if let Err(err) = self.flush() {
                warn!(
                    target: "procpipe",
                    "discarding {} unflushed bytes: {err}",
                    self.buf.len()
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PipeReader
// ---------------------------------------------------------------------------

/// Buffered readable stream over an owned descriptor.
///
/// Reads block until data arrives. End-of-stream is reported once the
/// descriptor returns zero bytes and the internal buffer is drained; a
/// reader over an invalid handle is at end-of-stream from the start.
#[derive(Debug)]
pub struct PipeReader {
    handle: Handle,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl PipeReader {
    /// Wrap an owned descriptor.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            buf: Vec::new(),
            pos: 0,
            eof: false,
        }
    }

    /// Next line without its terminator, or `None` at end-of-stream.
    ///
    /// Both `\n` and `\r\n` terminators are stripped. A final line with
    /// no terminator is still returned. Bytes that are not valid UTF-8
    /// are decoded lossily.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(offset) = self.buf[self.pos..].iter().position(|&b| b == b'\n') {
                let end = self.pos + offset;
                let line = decode_line(&self.buf[self.pos..end]);
                self.pos = end + 1;
                self.compact();
                return Ok(Some(line));
            }
            if self.eof {
                if self.pos < self.buf.len() {
                    let line = decode_line(&self.buf[self.pos..]);
                    self.pos = self.buf.len();
                    self.compact();
                    return Ok(Some(line));
                }
                return Ok(None);
            }
            self.fill()?;
        }
    }

    /// Next whitespace-delimited token, or `None` at end-of-stream.
    pub fn read_token(&mut self) -> io::Result<Option<String>> {
        if !self.skip_whitespace()? {
            return Ok(None);
        }
        let mut token = Vec::new();
        loop {
            while self.pos < self.buf.len() {
                let b = self.buf[self.pos];
                if b.is_ascii_whitespace() {
                    return Ok(Some(String::from_utf8_lossy(&token).into_owned()));
                }
                token.push(b);
                self.pos += 1;
            }
            self.compact();
            if self.eof {
                return Ok(Some(String::from_utf8_lossy(&token).into_owned()));
            }
            self.fill()?;
        }
    }

    /// True once the descriptor reported end-of-stream and every buffered
    /// byte has been consumed.
    pub fn at_eof(&self) -> bool {
        self.eof && self.pos == self.buf.len()
    }

    /// Release the descriptor. Bytes already buffered remain readable;
    /// after them the stream reports end-of-stream.
    pub fn close(&mut self) {
        self.handle.close();
        self.eof = true;
    }

    /// Advance past whitespace; `false` means end-of-stream came first.
    fn skip_whitespace(&mut self) -> io::Result<bool> {
        loop {
            while self.pos < self.buf.len() && self.buf[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos < self.buf.len() {
                return Ok(true);
            }
            self.compact();
            if self.eof {
                return Ok(false);
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.handle.read(&mut chunk)?;
        if n == 0 {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    fn compact(&mut self) {
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        } else if self.pos > READ_CHUNK {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.buf.len() {
            let n = (self.buf.len() - self.pos).min(out.len());
            out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
            self.pos += n;
            self.compact();
            return Ok(n);
        }
        if self.eof {
            return Ok(0);
        }
        let n = self.handle.read(out)?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }
}

impl BufRead for PipeReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos >= self.buf.len() && !self.eof {
            self.compact();
            self.fill()?;
        }
        Ok(&self.buf[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.buf.len());
        self.compact();
    }
}

fn decode_line(mut bytes: &[u8]) -> String {
    if bytes.last() == Some(&b'\r') {
        bytes = &bytes[..bytes.len() - 1];
    }
    String::from_utf8_lossy(bytes).into_owned()
}
