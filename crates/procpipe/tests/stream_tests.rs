// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stream adapter tests over plain file descriptors.
//!
//! `PipeWriter` and `PipeReader` work over any descriptor, so files
//! stand in for pipe ends here — which is also exactly how a redirect
//! target gets read back in real use.

use std::fs::File;
use std::io::{BufRead, Seek, SeekFrom, Write as _};

use procpipe::{Handle, PipeReader, PipeWriter};
use proptest::prelude::*;

fn owned(file: File) -> Handle {
    #[cfg(unix)]
    {
        use std::os::unix::io::IntoRawFd;
        Handle::from_raw(file.into_raw_fd())
    }
    #[cfg(windows)]
    {
        use std::os::windows::io::IntoRawHandle;
        Handle::from_raw(file.into_raw_handle())
    }
}

fn reader_over(contents: &str) -> PipeReader {
    let mut tmp = tempfile::tempfile().unwrap();
    tmp.write_all(contents.as_bytes()).unwrap();
    tmp.seek(SeekFrom::Start(0)).unwrap();
    PipeReader::new(owned(tmp))
}

// ── Line extraction ──────────────────────────────────────────────────

#[test]
fn read_line_strips_both_terminator_styles() {
    let mut reader = reader_over("unix\nwindows\r\nfinal");
    assert_eq!(reader.read_line().unwrap().as_deref(), Some("unix"));
    assert_eq!(reader.read_line().unwrap().as_deref(), Some("windows"));
    assert_eq!(reader.read_line().unwrap().as_deref(), Some("final"));
    assert_eq!(reader.read_line().unwrap(), None);
}

#[test]
fn empty_stream_is_immediately_at_end() {
    let mut reader = reader_over("");
    assert_eq!(reader.read_line().unwrap(), None);
    assert!(reader.at_eof());
}

#[test]
fn empty_lines_are_preserved() {
    let mut reader = reader_over("a\n\nb\n");
    assert_eq!(reader.read_line().unwrap().as_deref(), Some("a"));
    assert_eq!(reader.read_line().unwrap().as_deref(), Some(""));
    assert_eq!(reader.read_line().unwrap().as_deref(), Some("b"));
    assert_eq!(reader.read_line().unwrap(), None);
}

#[test]
fn invalid_handle_reader_is_at_end_from_the_start() {
    let mut reader = PipeReader::new(Handle::invalid());
    assert_eq!(reader.read_line().unwrap(), None);
    assert_eq!(reader.read_token().unwrap(), None);
}

#[test]
fn bufread_integration_yields_the_same_lines() {
    let reader = reader_over("x\ny\n");
    let lines: Vec<String> = reader.lines().map(Result::unwrap).collect();
    assert_eq!(lines, ["x", "y"]);
}

#[test]
fn close_serves_buffered_bytes_then_reports_end() {
    let mut reader = reader_over("kept\nbuffered");
    assert_eq!(reader.read_line().unwrap().as_deref(), Some("kept"));
    reader.close();
    // The first fill already pulled everything into the buffer; close
    // only stops further descriptor reads.
    assert_eq!(reader.read_line().unwrap().as_deref(), Some("buffered"));
    assert_eq!(reader.read_line().unwrap(), None);
    assert!(reader.at_eof());
}

// ── Token extraction ─────────────────────────────────────────────────

#[test]
fn read_token_skips_mixed_whitespace() {
    let mut reader = reader_over("  one\t two\n\nthree ");
    assert_eq!(reader.read_token().unwrap().as_deref(), Some("one"));
    assert_eq!(reader.read_token().unwrap().as_deref(), Some("two"));
    assert_eq!(reader.read_token().unwrap().as_deref(), Some("three"));
    assert_eq!(reader.read_token().unwrap(), None);
}

proptest! {
    #[test]
    fn tokens_match_split_whitespace(s in "[a-z0-9 \t\n]{0,200}") {
        let mut reader = reader_over(&s);
        let mut tokens = Vec::new();
        while let Some(token) = reader.read_token().unwrap() {
            tokens.push(token);
        }
        let expected: Vec<String> = s.split_whitespace().map(str::to_string).collect();
        prop_assert_eq!(tokens, expected);
    }
}

// ── Writer buffering ─────────────────────────────────────────────────

#[test]
fn writer_buffers_until_a_newline_arrives() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut writer = PipeWriter::new(owned(file.reopen().unwrap()));

    writer.write_all(b"partial").unwrap();
    assert_eq!(std::fs::read(file.path()).unwrap(), b"");

    writer.write_all(b" line\nrest").unwrap();
    assert_eq!(std::fs::read(file.path()).unwrap(), b"partial line\n");

    writer.flush().unwrap();
    assert_eq!(std::fs::read(file.path()).unwrap(), b"partial line\nrest");
}

#[test]
fn write_line_flushes_immediately() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut writer = PipeWriter::new(owned(file.reopen().unwrap()));
    writer.write_line("hello").unwrap();
    assert_eq!(std::fs::read(file.path()).unwrap(), b"hello\n");
}

#[test]
fn close_flushes_the_remainder_and_is_idempotent() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut writer = PipeWriter::new(owned(file.reopen().unwrap()));
    writer.write_all(b"tail").unwrap();
    writer.close().unwrap();
    assert!(writer.is_closed());
    assert_eq!(std::fs::read(file.path()).unwrap(), b"tail");

    // A second close is a no-op, not a double release.
    writer.close().unwrap();
}

#[test]
fn drop_flushes_buffered_bytes() {
    let file = tempfile::NamedTempFile::new().unwrap();
    {
        let mut writer = PipeWriter::new(owned(file.reopen().unwrap()));
        writer.write_all(b"flushed on drop").unwrap();
    }
    assert_eq!(std::fs::read(file.path()).unwrap(), b"flushed on drop");
}

#[test]
fn writer_over_invalid_handle_reports_broken_pipe() {
    let mut writer = PipeWriter::new(Handle::invalid());
    let err = writer.write_line("nowhere to go").unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
}
