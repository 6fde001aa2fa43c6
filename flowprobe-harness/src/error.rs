use std::path::PathBuf;

use thiserror::Error;

/// Error surface for staging, launching, injecting, and supervising.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Core(#[from] flowprobe_core::CoreError),

    #[error("empty daemon command line")]
    EmptyCommand,

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read daemon output: {0}")]
    Output(#[source] std::io::Error),

    #[error("could not open connection to {target}")]
    Unreachable { target: String },

    #[error("injector '{injector}' failed: {message}")]
    Injector { injector: String, message: String },

    #[error("signal delivery failed: {0}")]
    Signal(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> HarnessError {
    HarnessError::Io {
        path: path.into(),
        source,
    }
}
