//! Diagnostic line patterns.
//!
//! A [`PatternSpec`] is the serializable, per-role description of the lines a
//! daemon writes to stderr. [`PatternSet`] is its compiled form; it only
//! classifies lines and never remembers whether a trigger already fired.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Marker every built-in role prints once its logger shuts down cleanly.
pub const CLEAN_SHUTDOWN_MARKER: &str = "Stopped logging";

/// Optional capability probe resolved by the first success or failure line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// Short label used in logs and the skip message.
    pub name: String,
    pub success: String,
    pub failure: String,
}

/// Uncompiled line patterns for one daemon role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    /// Progress line; the named group `count` (or group 1) carries the
    /// number of units. Without a capture group each match counts one.
    pub progress: String,
    /// Ready/started marker that fires the network-start trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<String>,
    /// Clean-shutdown confirmation.
    pub shutdown: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeSpec>,
}

/// Partial [`PatternSpec`] read from a harness config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatternOverrides {
    pub progress: Option<String>,
    pub ready: Option<String>,
    pub shutdown: Option<String>,
    pub probe: Option<ProbeSpec>,
}

impl PatternSpec {
    /// Replace every field the overrides set.
    pub fn apply(&mut self, overrides: &PatternOverrides) {
        if let Some(progress) = &overrides.progress {
            self.progress = progress.clone();
        }
        if let Some(ready) = &overrides.ready {
            self.ready = Some(ready.clone());
        }
        if let Some(shutdown) = &overrides.shutdown {
            self.shutdown = shutdown.clone();
        }
        if let Some(probe) = &overrides.probe {
            self.probe = Some(probe.clone());
        }
    }
}

/// Resolution of a capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Passed,
    Failed,
}

#[derive(Debug, Clone)]
struct CompiledProbe {
    name: String,
    success: Regex,
    failure: Regex,
}

/// Compiled, immutable pattern definitions.
#[derive(Debug, Clone)]
pub struct PatternSet {
    progress: Regex,
    ready: Option<Regex>,
    shutdown: Regex,
    probe: Option<CompiledProbe>,
}

impl PatternSet {
    pub fn compile(spec: &PatternSpec) -> Result<Self, CoreError> {
        let probe = match &spec.probe {
            Some(probe) => Some(CompiledProbe {
                name: probe.name.clone(),
                success: compile("probe success", &probe.success)?,
                failure: compile("probe failure", &probe.failure)?,
            }),
            None => None,
        };

        Ok(Self {
            progress: compile("progress", &spec.progress)?,
            ready: spec
                .ready
                .as_deref()
                .map(|pattern| compile("ready", pattern))
                .transpose()?,
            shutdown: compile("shutdown", &spec.shutdown)?,
            probe,
        })
    }

    /// Units reported by a progress line, or `None` when the line is not one.
    ///
    /// A captured value that does not fit in `u64` is treated as no match.
    pub fn progress_count(&self, line: &str) -> Option<u64> {
        let captures = self.progress.captures(line)?;
        let group = captures.name("count").or_else(|| captures.get(1));
        match group {
            Some(digits) => digits.as_str().parse().ok(),
            None => Some(1),
        }
    }

    pub fn is_ready(&self, line: &str) -> bool {
        self.ready
            .as_ref()
            .map(|ready| ready.is_match(line))
            .unwrap_or(false)
    }

    pub fn has_ready(&self) -> bool {
        self.ready.is_some()
    }

    pub fn is_clean_shutdown(&self, line: &str) -> bool {
        self.shutdown.is_match(line)
    }

    /// Failure wins when a single line matches both probe markers.
    pub fn probe_result(&self, line: &str) -> Option<ProbeResult> {
        let probe = self.probe.as_ref()?;
        if probe.failure.is_match(line) {
            Some(ProbeResult::Failed)
        } else if probe.success.is_match(line) {
            Some(ProbeResult::Passed)
        } else {
            None
        }
    }

    pub fn probe_name(&self) -> Option<&str> {
        self.probe.as_ref().map(|probe| probe.name.as_str())
    }
}

fn compile(name: &'static str, pattern: &str) -> Result<Regex, CoreError> {
    Regex::new(pattern).map_err(|source| CoreError::Pattern {
        name,
        pattern: pattern.to_string(),
        source,
    })
}
