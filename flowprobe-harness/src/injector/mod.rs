//! Network data injectors.
//!
//! Both shapes share the [`Injector`] contract so the supervisor can hold
//! them as one set: `start` when the ready trigger fires, `stop` during
//! teardown whether or not the daemon is still alive. `stop` never blocks.

mod spawned;
mod streaming;

use tokio::sync::mpsc;

use crate::error::HarnessError;

pub use spawned::{GeneratorCommand, RecordInjector};
pub use streaming::{connect_any, pump, PumpStats, StreamInjector, TCP_CHUNK};

/// Synthetic input source aimed at the daemon-under-test.
pub trait Injector: Send {
    /// Label used in logs and fault reports.
    fn name(&self) -> String;

    /// Begin injecting without blocking the caller.
    fn start(&mut self) -> Result<(), HarnessError>;

    /// Request that injection cease. Idempotent and non-blocking.
    fn stop(&mut self);
}

/// Unrecoverable injector failure that must end the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectorFault {
    pub injector: String,
    pub message: String,
}

impl From<InjectorFault> for HarnessError {
    fn from(fault: InjectorFault) -> Self {
        HarnessError::Injector {
            injector: fault.injector,
            message: fault.message,
        }
    }
}

pub type FaultSender = mpsc::UnboundedSender<InjectorFault>;
pub type FaultReceiver = mpsc::UnboundedReceiver<InjectorFault>;
