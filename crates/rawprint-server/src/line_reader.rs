// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Line reader that tees every consumed byte into a read-ahead buffer.
//
// A raw print stream has no length prefix, so the header parser has to
// consume bytes before it knows whether the job is acceptable.  Everything
// it consumed must later be replayed in front of the live socket, which is
// why the reader keeps a byte-exact copy of the stream up to its current
// position.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Line feed.
pub const BYTE_LF: u8 = 10;

/// Carriage return.
pub const BYTE_CR: u8 = 13;

/// End-of-transmission byte some spoolers send to mark the end of a job,
/// without a trailing newline.
pub const BYTE_END_OF_PRINTJOB: u8 = 4;

/// Initial capacity for a single line.
const LINE_CAPACITY: usize = 128;

/// Buffered line reader with a write-through copy of everything it reads.
///
/// Lines end at CR, LF or [`BYTE_END_OF_PRINTJOB`].  The terminator is
/// recorded in the read-ahead buffer but not in the returned line.
///
/// With a limit set, the reader stops once the read-ahead buffer holds that
/// many bytes: the line being assembled is dropped and every later call
/// reports end of input.  [`limit_reached`](Self::limit_reached) tells this
/// apart from a real end of stream.
#[derive(Debug)]
pub struct TeeLineReader<R> {
    inner: BufReader<R>,
    read_ahead: Vec<u8>,
    limit: Option<usize>,
    limit_reached: bool,
}

impl<R: AsyncRead + Unpin> TeeLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_limit(inner, None)
    }

    /// `limit` bounds the read-ahead buffer; `None` leaves it unbounded.
    pub fn with_limit(inner: R, limit: Option<usize>) -> Self {
        Self {
            inner: BufReader::new(inner),
            read_ahead: Vec::new(),
            limit,
            limit_reached: false,
        }
    }

    /// Read the next line.
    ///
    /// Returns `Ok(None)` when the source is exhausted before a single byte
    /// could be read, or when the read-ahead limit is hit.  An empty line (a
    /// bare terminator) is `Some("")`.  I/O errors are passed through
    /// unchanged.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line: Option<Vec<u8>> = None;

        while let Some(byte) = self.next_byte().await? {
            let current = line.get_or_insert_with(|| Vec::with_capacity(LINE_CAPACITY));
            if matches!(byte, BYTE_LF | BYTE_CR | BYTE_END_OF_PRINTJOB) {
                break;
            }
            current.push(byte);
        }

        if self.limit_reached {
            return Ok(None);
        }
        Ok(line.map(decode_line))
    }

    /// True once the read-ahead limit stopped the reader.
    pub fn limit_reached(&self) -> bool {
        self.limit_reached
    }

    /// Everything consumed so far, byte for byte.
    pub fn read_ahead(&self) -> &[u8] {
        &self.read_ahead
    }

    /// Take the read-ahead buffer, leaving an empty one behind.
    pub fn take_read_ahead(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.read_ahead)
    }

    /// The unconsumed remainder of the stream.
    ///
    /// Reads through this handle are not recorded in the read-ahead buffer.
    /// Bytes already buffered internally but not yet consumed are served
    /// first, so nothing is lost between header parsing and streaming.
    pub fn remaining(&mut self) -> &mut BufReader<R> {
        &mut self.inner
    }

    async fn next_byte(&mut self) -> io::Result<Option<u8>> {
        if self.limit_reached {
            return Ok(None);
        }
        if self.limit.is_some_and(|limit| self.read_ahead.len() >= limit) {
            self.limit_reached = true;
            return Ok(None);
        }
        let buf = self.inner.fill_buf().await?;
        let Some(&byte) = buf.first() else {
            return Ok(None);
        };
        self.inner.consume(1);
        self.read_ahead.push(byte);
        Ok(Some(byte))
    }
}

/// Decode a line as UTF-8, falling back to one char per byte (Latin-1) for
/// legacy drivers that emit 8-bit header text.
fn decode_line(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}
