//! Error types for flowprobe-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while building a harness run from configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure while reading a config or template file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on a harness config file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A line pattern failed to compile.
    #[error("invalid {name} pattern '{pattern}': {source}")]
    Pattern {
        name: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A `--pdu` / `--tcp` target did not have the `A,ADDRESS,PORT` shape.
    #[error("invalid injector target '{spec}': {reason}")]
    InvalidTarget { spec: String, reason: String },

    /// A staging instruction did not have the `FILE:DIRNAME` shape.
    #[error("invalid staging instruction '{spec}': expected FILE:DIRNAME")]
    InvalidStaging { spec: String },

    /// A staging instruction or argument named a directory the layout lacks.
    #[error("unknown destination directory '{name}'")]
    UnknownDirectory { name: String },

    /// A template placeholder had no matching directory.
    #[error("template placeholder '${key}' has no matching directory")]
    Template { key: String },

    /// Role name not one of the built-in daemon roles.
    #[error("unknown daemon role '{0}'; expected: flowpack, flowappend, flowcap")]
    UnknownRole(String),
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
