//! flowprobe harness — stages a daemon's directories, launches it, feeds it
//! synthetic input, watches its stderr, and decides whether the run passed.
//!
//! - [`staging`] — directory layout, file placement, config rendering
//! - [`run_log`] — the shared, append-only run log
//! - [`line_reader`] — timed line reads from the daemon's stderr
//! - [`injector`] — spawned record generator and TCP file streamer
//! - [`tracker`] — progress accounting and the escalation state machine
//! - [`supervisor`] — the supervision loop and teardown

mod error;
pub mod injector;
pub mod line_reader;
pub mod run_log;
mod runtime;
mod signal;
pub mod staging;
pub mod supervisor;
pub mod tracker;

pub use error::HarnessError;
pub use injector::{
    FaultSender, GeneratorCommand, Injector, InjectorFault, RecordInjector, StreamInjector,
};
pub use line_reader::{ReadOutcome, TimedLineReader};
pub use run_log::RunLog;
pub use runtime::{ephemeral_port, init_tracing, run_blocking};
pub use supervisor::{RunOutcome, RunReport, Supervisor, SupervisorConfig};
pub use tracker::{Action, Escalation, ProgressState, ProgressTracker, TerminationCause};
