//! Built-in daemon roles and the argument vector each one is launched with.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::layout::StagingLayout;
use crate::patterns::{PatternSpec, CLEAN_SHUTDOWN_MARKER};

/// Flow-collection daemons the harness knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonRole {
    /// Packs incoming flow data into a repository.
    Flowpack,
    /// Appends incremental files to hourly files.
    Flowappend,
    /// Captures network flow data into files.
    Flowcap,
}

impl DaemonRole {
    pub const ALL: [DaemonRole; 3] = [
        DaemonRole::Flowpack,
        DaemonRole::Flowappend,
        DaemonRole::Flowcap,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DaemonRole::Flowpack => "flowpack",
            DaemonRole::Flowappend => "flowappend",
            DaemonRole::Flowcap => "flowcap",
        }
    }

    /// Default profile for this role.
    pub fn profile(self) -> RoleProfile {
        match self {
            DaemonRole::Flowpack => RoleProfile {
                role: self,
                program_env: "RWFLOWPACK".to_string(),
                default_program: "./rwflowpack".to_string(),
                directories: names(&[
                    "incoming",
                    "archive",
                    "error",
                    "sender",
                    "incremental",
                    "root",
                    "log",
                    "incoming2",
                    "incoming3",
                    "incoming4",
                ]),
                log_file: "rwflowpack-daemon.log".to_string(),
                unit: CountUnit::Records,
                patterns: PatternSpec {
                    progress: r": /[^:].*: (?P<count>[0-9]+) recs".to_string(),
                    ready: Some("Starting flush timer".to_string()),
                    shutdown: CLEAN_SHUTDOWN_MARKER.to_string(),
                    probe: None,
                },
            },
            DaemonRole::Flowappend => RoleProfile {
                role: self,
                program_env: "RWFLOWAPPEND".to_string(),
                default_program: "./rwflowappend".to_string(),
                directories: names(&["incoming", "archive", "error", "root", "log"]),
                log_file: "rwflowappend-daemon.log".to_string(),
                unit: CountUnit::Files,
                patterns: PatternSpec {
                    progress: "APPEND OK".to_string(),
                    ready: None,
                    shutdown: CLEAN_SHUTDOWN_MARKER.to_string(),
                    probe: None,
                },
            },
            DaemonRole::Flowcap => RoleProfile {
                role: self,
                program_env: "FLOWCAP".to_string(),
                default_program: "./flowcap".to_string(),
                directories: names(&["destination", "log"]),
                log_file: "flowcap-daemon.log".to_string(),
                unit: CountUnit::Records,
                patterns: PatternSpec {
                    progress: r"Closing file .* seconds, (?P<count>[0-9]+) records,".to_string(),
                    ready: Some(r"'.+': Reader thread started".to_string()),
                    shutdown: CLEAN_SHUTDOWN_MARKER.to_string(),
                    probe: None,
                },
            },
        }
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|name| name.to_string()).collect()
}

impl fmt::Display for DaemonRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DaemonRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flowpack" | "rwflowpack" => Ok(DaemonRole::Flowpack),
            "flowappend" | "rwflowappend" => Ok(DaemonRole::Flowappend),
            "flowcap" => Ok(DaemonRole::Flowcap),
            other => Err(CoreError::UnknownRole(other.to_string())),
        }
    }
}

/// What a role's progress lines count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountUnit {
    Records,
    Files,
}

impl CountUnit {
    /// Plural noun used in mismatch reports.
    pub fn noun(self) -> &'static str {
        match self {
            CountUnit::Records => "records",
            CountUnit::Files => "files",
        }
    }

    /// Label of the summary count line.
    pub fn label(self) -> &'static str {
        match self {
            CountUnit::Records => "Record count",
            CountUnit::Files => "File count",
        }
    }
}

/// Everything the harness needs to know about one daemon role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub role: DaemonRole,
    /// Environment variable naming the daemon program.
    pub program_env: String,
    pub default_program: String,
    /// Directories staged under the base directory.
    pub directories: Vec<String>,
    /// Run-log file name inside the `log` directory.
    pub log_file: String,
    pub unit: CountUnit,
    pub patterns: PatternSpec,
}

/// Per-run launch knobs that end up on the daemon's command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub log_level: String,
    /// `--flush-timeout` for flowpack, `--timeout` for flowcap.
    pub role_timeout: u64,
    pub input_mode: Option<String>,
    pub output_mode: Option<String>,
    /// Rendered sensor configuration (flowpack only).
    pub sensor_configuration: Option<PathBuf>,
    /// Arguments passed through ahead of the harness-managed flags.
    pub extra_args: Vec<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            role_timeout: 10,
            input_mode: None,
            output_mode: None,
            sensor_configuration: None,
            extra_args: Vec::new(),
        }
    }
}

impl RoleProfile {
    /// Program command line: explicit override, then the role's env var,
    /// then the built-in default.
    pub fn resolve_program(&self, explicit: Option<&str>) -> String {
        if let Some(program) = explicit {
            return program.to_string();
        }
        std::env::var(&self.program_env).unwrap_or_else(|_| self.default_program.clone())
    }

    /// Full argument vector for the daemon-under-test.
    pub fn daemon_argv(
        &self,
        program: &str,
        options: &LaunchOptions,
        layout: &StagingLayout,
    ) -> Result<Vec<String>, CoreError> {
        let mut argv: Vec<String> = program.split_whitespace().map(str::to_string).collect();
        argv.extend(options.extra_args.iter().cloned());
        let dir = |name: &str| -> Result<String, CoreError> {
            Ok(layout.path(name)?.display().to_string())
        };

        match self.role {
            DaemonRole::Flowpack => {
                push_flag(&mut argv, "--flush-timeout", options.role_timeout.to_string());
                push_logging_flags(&mut argv, options);
                if matches!(options.input_mode.as_deref(), Some("fcfiles" | "respool")) {
                    push_flag(&mut argv, "--incoming-directory", dir("incoming")?);
                }
                push_flag(&mut argv, "--archive-directory", dir("archive")?);
                push_flag(&mut argv, "--error-directory", dir("error")?);
                match options.output_mode.as_deref() {
                    Some("sending") => {
                        push_flag(&mut argv, "--sender-directory", dir("sender")?);
                        push_flag(&mut argv, "--incremental-directory", dir("incremental")?);
                    }
                    Some("incremental-files") => {
                        push_flag(&mut argv, "--incremental-directory", dir("incremental")?);
                    }
                    _ => push_flag(&mut argv, "--root-directory", dir("root")?),
                }
                if let Some(mode) = &options.input_mode {
                    push_flag(&mut argv, "--input-mode", mode.clone());
                }
                if let Some(mode) = &options.output_mode {
                    push_flag(&mut argv, "--output-mode", mode.clone());
                }
                if let Some(conf) = &options.sensor_configuration {
                    push_flag(&mut argv, "--sensor-configuration", conf.display().to_string());
                }
            }
            DaemonRole::Flowappend => {
                push_logging_flags(&mut argv, options);
                push_flag(&mut argv, "--root-directory", dir("root")?);
                push_flag(&mut argv, "--incoming-directory", dir("incoming")?);
                push_flag(&mut argv, "--archive-directory", dir("archive")?);
                push_flag(&mut argv, "--error-directory", dir("error")?);
            }
            DaemonRole::Flowcap => {
                push_flag(&mut argv, "--timeout", options.role_timeout.to_string());
                push_logging_flags(&mut argv, options);
                push_flag(&mut argv, "--destination-directory", dir("destination")?);
            }
        }

        Ok(argv)
    }

    /// Count the run is expected to reach, if any.
    ///
    /// flowappend always expects one appended file per pre-launch staged file.
    /// A limit of zero means no limit.
    pub fn expected_count(&self, limit: Option<u64>, staged_files: usize) -> Option<u64> {
        match self.role {
            DaemonRole::Flowappend => Some(staged_files as u64),
            DaemonRole::Flowpack | DaemonRole::Flowcap => limit.filter(|&limit| limit > 0),
        }
    }
}

fn push_flag(argv: &mut Vec<String>, name: &str, value: String) {
    argv.push(name.to_string());
    argv.push(value);
}

/// Log to stderr at the requested level and stay in the foreground.
fn push_logging_flags(argv: &mut Vec<String>, options: &LaunchOptions) {
    push_flag(argv, "--log-dest", "stderr".to_string());
    push_flag(argv, "--log-level", options.log_level.clone());
    argv.push("--no-daemon".to_string());
}
