use std::process::Stdio;

use tokio::process::{Child, Command};

use flowprobe_core::targets::{bracketed, PduTarget};

use crate::error::HarnessError;
use crate::run_log::RunLog;
use crate::signal::request_stop;

use super::Injector;

/// Command line of the external record generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorCommand(Vec<String>);

impl GeneratorCommand {
    pub fn new(command: &str) -> Self {
        Self(command.split_whitespace().map(str::to_string).collect())
    }

    pub fn from_argv(argv: Vec<String>) -> Self {
        Self(argv)
    }

    /// `$FLOWPROBE_GENERATOR`, else `$PERL $top_srcdir/tests/make-data.pl`.
    pub fn from_env() -> Self {
        if let Ok(command) = std::env::var("FLOWPROBE_GENERATOR") {
            return Self::new(&command);
        }
        let perl = std::env::var("PERL").unwrap_or_else(|_| "perl".to_string());
        let top = std::env::var("top_srcdir").unwrap_or_else(|_| ".".to_string());
        Self(vec![perl, format!("{top}/tests/make-data.pl")])
    }

    fn argv(&self, target: &PduTarget) -> Vec<String> {
        let mut argv = self.0.clone();
        argv.extend([
            "--pdu-network".to_string(),
            bracketed(&target.address, target.port),
            "--max-records".to_string(),
            target.records.to_string(),
        ]);
        argv
    }
}

/// Emits exactly `records` generated PDUs through a helper process.
pub struct RecordInjector {
    target: PduTarget,
    generator: GeneratorCommand,
    log: RunLog,
    child: Option<Child>,
}

impl RecordInjector {
    pub fn new(target: PduTarget, generator: GeneratorCommand, log: RunLog) -> Self {
        Self {
            target,
            generator,
            log,
            child: None,
        }
    }

    pub fn command_line(&self) -> Vec<String> {
        self.generator.argv(&self.target)
    }
}

impl Injector for RecordInjector {
    fn name(&self) -> String {
        format!(
            "pdu {} -> {}",
            self.target.records,
            bracketed(&self.target.address, self.target.port)
        )
    }

    fn start(&mut self) -> Result<(), HarnessError> {
        if self.child.is_some() {
            return Ok(());
        }
        let argv = self.command_line();
        let (program, args) = argv.split_first().ok_or(HarnessError::EmptyCommand)?;
        self.log.event(format!("Starting: {argv:?}"));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                program: program.clone(),
                source,
            })?;
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(%status, injector = %self.name(), "generator already exited");
            }
            Ok(None) => {
                if let Err(err) = request_stop(child) {
                    tracing::warn!(error = %err, "failed to stop record generator");
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to poll record generator"),
        }
    }
}
