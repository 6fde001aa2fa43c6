//! Reduces an observed run to report lines and a harness exit code.
//!
//! Count mismatches and unclean shutdowns are reported but never change the
//! exit code: the supervised daemon's own exit status is authoritative.

use std::fmt;

use serde::Serialize;

use crate::role::CountUnit;

/// Exit code when the daemon never produced an exit status of its own.
pub const NO_CHILD_EXIT_CODE: i32 = 1;

/// Exit code for runs that could not validly execute (probe failure).
pub const SKIP_EXIT_CODE: i32 = 77;

/// How the daemon-under-test ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ChildExit {
    /// Normal exit with a status code.
    Code(i32),
    /// Terminated by a signal.
    Signal(i32),
}

impl ChildExit {
    /// Shell-style status: the code itself, or `128 + signal`.
    pub fn status(self) -> i32 {
        match self {
            ChildExit::Code(code) => code,
            ChildExit::Signal(signal) => 128 + signal,
        }
    }
}

impl fmt::Display for ChildExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildExit::Code(code) => write!(f, "{code}"),
            ChildExit::Signal(signal) => write!(f, "signal {signal}"),
        }
    }
}

/// Inputs to the reducer; immutable once the child is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub unit: CountUnit,
    pub expected: Option<u64>,
    pub observed: u64,
    pub clean_shutdown: bool,
    pub child_exit: Option<ChildExit>,
}

/// Reducer output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub lines: Vec<String>,
    pub exit_code: i32,
}

impl Report {
    /// Whether any diagnostic line flagged a soft failure.
    pub fn has_errors(&self) -> bool {
        self.lines.iter().any(|line| line.starts_with("ERROR:"))
    }
}

impl Verdict {
    pub fn exit_code(&self) -> i32 {
        self.child_exit
            .map(ChildExit::status)
            .unwrap_or(NO_CHILD_EXIT_CODE)
    }

    pub fn reduce(&self) -> Report {
        let mut lines = vec![format!("{}: {}", self.unit.label(), self.observed)];
        if let Some(expected) = self.expected {
            if expected != self.observed {
                let noun = self.unit.noun();
                lines.push(format!(
                    "ERROR: expecting {expected} {noun}, got {} {noun}",
                    self.observed
                ));
            }
        }
        if !self.clean_shutdown {
            lines.push("ERROR: shutdown was not clean".to_string());
        }
        Report {
            lines,
            exit_code: self.exit_code(),
        }
    }
}
