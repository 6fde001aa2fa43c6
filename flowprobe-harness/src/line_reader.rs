//! Timed line reader over a daemon's diagnostic stream.
//!
//! [`TimedLineReader::next_line`] never blocks longer than its timeout and
//! distinguishes "no output yet" ([`ReadOutcome::Empty`]) from "stream
//! closed" ([`ReadOutcome::EndOfStream`]); the supervisor loop depends on
//! that distinction to keep evaluating its timers while the child is quiet.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{timeout_at, Instant};

/// Bytes requested from the descriptor per underlying read.
pub const READ_CHUNK: usize = 1024;

/// Result of one [`TimedLineReader::next_line`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line, terminator included.
    Line(String),
    /// Nothing complete arrived within the timeout.
    Empty,
    /// The descriptor reached end-of-stream; every later call returns this too.
    EndOfStream,
}

/// Accumulates fragments from `source` and hands out whole lines.
///
/// Bytes are decoded one byte per character (ISO-8859-1), so any input is
/// representable and a line's `chars()` map back to the original bytes.
#[derive(Debug)]
pub struct TimedLineReader<R> {
    source: R,
    buffer: Vec<u8>,
    closed: bool,
}

impl<R: AsyncRead + Unpin> TimedLineReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            closed: false,
        }
    }

    /// Return the next complete line, waiting at most `timeout` in total.
    ///
    /// Cancel-safe: bytes already read stay buffered if the future is dropped.
    pub async fn next_line(&mut self, timeout: Duration) -> io::Result<ReadOutcome> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(line) = self.take_line() {
                return Ok(ReadOutcome::Line(line));
            }
            if self.closed {
                return Ok(ReadOutcome::EndOfStream);
            }

            match timeout_at(deadline, self.source.read(&mut chunk)).await {
                Err(_elapsed) => return Ok(ReadOutcome::Empty),
                Ok(Ok(0)) => {
                    self.closed = true;
                    return Ok(ReadOutcome::EndOfStream);
                }
                Ok(Ok(n)) => self.buffer.extend_from_slice(&chunk[..n]),
                Ok(Err(err)) if err.kind() == io::ErrorKind::Interrupted => continue,
                Ok(Err(err)) => return Err(err),
            }
        }
    }

    /// Unterminated bytes still buffered, decoded like a line.
    pub fn remainder(&self) -> String {
        latin1(&self.buffer)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=end).collect();
        Some(latin1(&line))
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Bytes a decoded line was read from.
pub fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| u8::try_from(c).unwrap_or(b'?')).collect()
}

/// Line text with the terminator and any trailing carriage return removed.
pub fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
