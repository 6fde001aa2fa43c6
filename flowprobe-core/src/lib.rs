//! flowprobe core library — daemon roles, line patterns, run configuration,
//! and the verdict reducer.
//!
//! Everything here is synchronous and free of process or socket handling;
//! `flowprobe-harness` drives the daemon with these definitions.
//!
//! - [`role`] — built-in daemon roles, profiles, argument vectors
//! - [`patterns`] — pattern specs and compiled [`PatternSet`]
//! - [`targets`] — `--pdu` / `--tcp` targets and staging instructions
//! - [`layout`] — [`StagingLayout`] and template rendering
//! - [`config`] — [`Timeouts`] and the `--config` file
//! - [`verdict`] — [`Verdict`] → [`Report`]

pub mod config;
pub mod error;
pub mod layout;
pub mod patterns;
pub mod role;
pub mod targets;
pub mod verdict;

pub use config::{HarnessConfig, Timeouts};
pub use error::CoreError;
pub use layout::{render_template, StagingLayout};
pub use patterns::{PatternOverrides, PatternSet, PatternSpec, ProbeResult, ProbeSpec};
pub use role::{CountUnit, DaemonRole, LaunchOptions, RoleProfile};
pub use targets::{PduTarget, StagingInstruction, StagingMode, TcpTarget};
pub use verdict::{ChildExit, Report, Verdict, NO_CHILD_EXIT_CODE, SKIP_EXIT_CODE};
