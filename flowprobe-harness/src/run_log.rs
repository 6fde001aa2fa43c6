//! The run log: one append-only file shared by the supervisor and injectors.
//!
//! Child output is written verbatim; harness events carry an
//! `"<asctime>: <program>: "` prefix. Every write goes through one mutex so
//! lines from concurrent writers never interleave mid-line.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;

use crate::error::{io_err, HarnessError};

enum Sink {
    File(File),
    Memory(Vec<u8>),
}

struct Inner {
    sink: Sink,
    program: String,
}

/// Cloneable handle to the run log.
#[derive(Clone)]
pub struct RunLog {
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for RunLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLog").finish_non_exhaustive()
    }
}

impl RunLog {
    /// Create (truncating) the log file at `path`.
    pub fn create(path: &Path, program: impl Into<String>) -> Result<Self, HarnessError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| io_err(path, e))?;
        Ok(Self::with_sink(Sink::File(file), program.into()))
    }

    /// Log held in memory; read back with [`RunLog::contents`].
    pub fn in_memory(program: impl Into<String>) -> Self {
        Self::with_sink(Sink::Memory(Vec::new()), program.into())
    }

    fn with_sink(sink: Sink, program: String) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { sink, program })),
        }
    }

    /// Append bytes exactly as received; only a missing newline is added.
    pub fn raw(&self, bytes: &[u8]) {
        tracing::debug!(
            target: "daemon",
            "{}",
            String::from_utf8_lossy(bytes).trim_end_matches(['\r', '\n'])
        );
        let mut inner = self.lock();
        inner.append(bytes);
    }

    /// Append a timestamped harness event.
    pub fn event(&self, message: impl fmt::Display) {
        let message = message.to_string();
        tracing::info!("{message}");
        let mut inner = self.lock();
        let stamp = Local::now().format("%a %b %e %H:%M:%S %Y");
        let line = format!("{stamp}: {}: {message}", inner.program);
        inner.append(line.as_bytes());
    }

    /// Copy of everything written so far; empty for file-backed logs.
    pub fn contents(&self) -> String {
        match &self.lock().sink {
            Sink::Memory(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Sink::File(_) => String::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn append(&mut self, bytes: &[u8]) {
        let newline: &[u8] = if bytes.ends_with(b"\n") { b"" } else { b"\n" };
        match &mut self.sink {
            Sink::Memory(buffer) => {
                buffer.extend_from_slice(bytes);
                buffer.extend_from_slice(newline);
            }
            Sink::File(file) => {
                // Unbuffered; each append reaches the file immediately.
                let written = file
                    .write_all(bytes)
                    .and_then(|()| file.write_all(newline));
                if let Err(err) = written {
                    tracing::warn!(error = %err, "run log write failed");
                }
            }
        }
    }
}
