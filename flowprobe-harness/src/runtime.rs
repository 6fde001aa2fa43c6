//! Process-level plumbing: tracing setup, the blocking entry point, and
//! small host helpers.

use std::net::TcpListener;

use crate::error::{io_err, HarnessError};
use crate::supervisor::{RunReport, Supervisor};

/// Install the stderr tracing subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Run `supervisor` on a fresh multi-threaded runtime and block until it
/// finishes.
pub fn run_blocking(supervisor: Supervisor) -> Result<RunReport, HarnessError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(supervisor.run())
}

/// A TCP port that was free a moment ago.
pub fn ephemeral_port() -> Result<u16, HarnessError> {
    let listener = TcpListener::bind(("0.0.0.0", 0)).map_err(|e| io_err("0.0.0.0:0", e))?;
    let port = listener
        .local_addr()
        .map_err(|e| io_err("0.0.0.0:0", e))?
        .port();
    Ok(port)
}
