//! Line framing for the handshake.
//!
//! The handshake exchanges single text lines, but the session that follows
//! is a raw byte stream. [`HandshakeLines`] buffers just enough to find line
//! ends and gives back whatever arrived past the last line when the
//! handshake is over ([`HandshakeLines::finish`]).

use std::io;

use bytes::{Bytes, BytesMut};
use memchr::memchr;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Longest accepted handshake line, in bytes, terminator excluded.
pub const MAX_LINE_LEN: usize = 4 * 1024;

/// Why no line could be read.
#[derive(Debug, Error)]
pub enum LineError {
    /// The client sent more than the limit without a line end.
    #[error("handshake line exceeds {0} bytes")]
    TooLong(usize),

    /// The connection closed in the middle of a line.
    #[error("connection closed mid-line")]
    Truncated,

    /// Reading the socket failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reads `\n` or `\r\n` terminated lines off the start of a stream.
#[derive(Debug)]
pub struct HandshakeLines<R> {
    stream: R,
    pending: BytesMut,
    /// Prefix of `pending` already searched for a line end.
    scanned: usize,
    limit: usize,
}

impl<R> HandshakeLines<R> {
    /// Frame `stream` with the [`MAX_LINE_LEN`] limit.
    pub fn new(stream: R) -> Self {
        Self::with_limit(stream, MAX_LINE_LEN)
    }

    /// Frame `stream` accepting lines of at most `limit` bytes.
    pub fn with_limit(stream: R, limit: usize) -> Self {
        Self { stream, pending: BytesMut::with_capacity(256), scanned: 0, limit: limit.max(1) }
    }

    /// End the handshake: the stream plus any bytes read past the last line.
    pub fn finish(self) -> (R, BytesMut) {
        (self.stream, self.pending)
    }

    /// Split off the next complete line, terminator removed.
    fn take_line(&mut self) -> Result<Option<Bytes>, LineError> {
        let Some(offset) = memchr(b'\n', &self.pending[self.scanned..]) else {
            self.scanned = self.pending.len();
            return Ok(None);
        };

        let newline = self.scanned + offset;
        self.scanned = 0;

        let mut line = self.pending.split_to(newline + 1).freeze();
        let end = if newline > 0 && line[newline - 1] == b'\r' { newline - 1 } else { newline };
        line.truncate(end);

        if line.len() > self.limit {
            return Err(LineError::TooLong(self.limit));
        }
        Ok(Some(line))
    }
}

impl<R: AsyncRead + Unpin> HandshakeLines<R> {
    /// Next line, possibly empty. `Ok(None)` if the client closed the
    /// connection between lines.
    pub async fn next_line(&mut self) -> Result<Option<Bytes>, LineError> {
        loop {
            if let Some(line) = self.take_line()? {
                return Ok(Some(line));
            }
            // Room for the terminator on top of a line at the limit.
            if self.pending.len() > self.limit + 1 {
                return Err(LineError::TooLong(self.limit));
            }

            if self.stream.read_buf(&mut self.pending).await? == 0 {
                return if self.pending.is_empty() { Ok(None) } else { Err(LineError::Truncated) };
            }
        }
    }
}
