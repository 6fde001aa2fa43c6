//! The daemon supervisor: launch, watch, escalate, tear down.
//!
//! A single task owns the child, the line reader, and the
//! [`ProgressTracker`]. Each tick reads at most one stderr line (waiting up
//! to the poll timeout), records it verbatim, lets the tracker classify it,
//! and carries out the returned actions. Injector faults arrive over a
//! channel and end the run. Teardown runs on every exit path.

use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

use flowprobe_core::{
    ChildExit, CountUnit, PatternSet, StagingInstruction, StagingLayout, Timeouts, Verdict,
    SKIP_EXIT_CODE,
};

use crate::error::HarnessError;
use crate::injector::{FaultReceiver, FaultSender, Injector, InjectorFault};
use crate::line_reader::{encode_latin1, strip_terminator, ReadOutcome, TimedLineReader};
use crate::run_log::RunLog;
use crate::signal::{force_stop, request_stop};
use crate::staging;
use crate::tracker::{Action, ProgressState, ProgressTracker, TerminationCause};

/// Everything the supervisor needs to launch and judge one daemon run.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    pub patterns: PatternSet,
    /// Expected unit count; reaching it schedules termination.
    pub limit: Option<u64>,
    pub timeouts: Timeouts,
    pub unit: CountUnit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(Verdict),
    /// A capability probe failed; the run is not meaningful.
    Skipped { probe: String, line: String },
}

/// Result of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub state: ProgressState,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        match &self.outcome {
            RunOutcome::Completed(verdict) => verdict.exit_code(),
            RunOutcome::Skipped { .. } => SKIP_EXIT_CODE,
        }
    }
}

struct DeferredStaging {
    layout: StagingLayout,
    instructions: Vec<StagingInstruction>,
}

enum Tick {
    Fault(InjectorFault),
    Read(io::Result<ReadOutcome>),
}

pub struct Supervisor {
    config: SupervisorConfig,
    log: RunLog,
    injectors: Vec<Box<dyn Injector>>,
    deferred: Option<DeferredStaging>,
    fault_tx: FaultSender,
    fault_rx: FaultReceiver,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, log: RunLog) -> Self {
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        Self {
            config,
            log,
            injectors: Vec::new(),
            deferred: None,
            fault_tx,
            fault_rx,
        }
    }

    /// Channel injectors use to report unrecoverable failures.
    pub fn fault_sender(&self) -> FaultSender {
        self.fault_tx.clone()
    }

    /// Register an injector to start when the ready marker first appears.
    pub fn add_injector(&mut self, injector: Box<dyn Injector>) {
        self.injectors.push(injector);
    }

    /// Staging applied once, together with the injector start.
    pub fn defer_staging(&mut self, layout: StagingLayout, instructions: Vec<StagingInstruction>) {
        if instructions.is_empty() {
            return;
        }
        match &mut self.deferred {
            Some(deferred) => deferred.instructions.extend(instructions),
            None => {
                self.deferred = Some(DeferredStaging {
                    layout,
                    instructions,
                })
            }
        }
    }

    /// Launch the daemon and supervise it to completion.
    ///
    /// Returns `Err` only when the daemon could not be launched or the run
    /// was aborted (injector fault, unreadable output, failed staging); the
    /// child is still torn down and reaped in the latter cases.
    pub async fn run(mut self) -> Result<RunReport, HarnessError> {
        let (program, args) = self
            .config
            .argv
            .split_first()
            .ok_or(HarnessError::EmptyCommand)?;
        self.log
            .event(format!("Running '{}'", self.config.argv.join("' '")));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                program: program.clone(),
                source,
            })?;
        tracing::debug!(pid = ?child.id(), "daemon launched");

        let Some(stderr) = child.stderr.take() else {
            force_stop(&mut child)?;
            return Err(HarnessError::Output(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "daemon stderr was not captured",
            )));
        };

        let mut tracker = ProgressTracker::new(
            self.config.patterns.clone(),
            self.config.limit,
            &self.config.timeouts,
            Instant::now(),
        );
        let mut reader = TimedLineReader::new(stderr);

        let result = self.supervise(&mut child, &mut reader, &mut tracker).await;
        let child_exit = self.teardown(&mut child).await;
        tracker.mark_reaped();

        let skipped = result?;
        let state = tracker.state().clone();
        let outcome = match skipped {
            Some((probe, line)) => RunOutcome::Skipped { probe, line },
            None => RunOutcome::Completed(Verdict {
                unit: self.config.unit,
                expected: self.config.limit,
                observed: state.observed,
                clean_shutdown: state.clean_shutdown,
                child_exit,
            }),
        };
        Ok(RunReport { outcome, state })
    }

    /// Main loop. Returns the failed probe when the run was skipped.
    async fn supervise<R>(
        &mut self,
        child: &mut Child,
        reader: &mut TimedLineReader<R>,
        tracker: &mut ProgressTracker,
    ) -> Result<Option<(String, String)>, HarnessError>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let poll = self.config.timeouts.poll;

        loop {
            let tick = tokio::select! {
                biased;
                Some(fault) = self.fault_rx.recv() => Tick::Fault(fault),
                read = reader.next_line(poll) => Tick::Read(read),
            };

            let line = match tick {
                Tick::Fault(fault) => {
                    self.log.event(format!(
                        "Injector failure: {}: {}",
                        fault.injector, fault.message
                    ));
                    return Err(fault.into());
                }
                Tick::Read(Ok(ReadOutcome::Line(line))) => {
                    self.log.raw(&encode_latin1(&line));
                    Some(line)
                }
                Tick::Read(Ok(ReadOutcome::Empty)) => {
                    if matches!(child.try_wait(), Ok(Some(_))) {
                        return Ok(None);
                    }
                    None
                }
                Tick::Read(Ok(ReadOutcome::EndOfStream)) => {
                    let rest = reader.remainder();
                    if !rest.is_empty() {
                        self.log.raw(&encode_latin1(&rest));
                    }
                    return Ok(None);
                }
                Tick::Read(Err(err)) => return Err(HarnessError::Output(err)),
            };

            let actions = tracker.observe(line.as_deref().map(strip_terminator), Instant::now());
            for action in actions {
                if let Some(skipped) = self.perform(action, child)? {
                    return Ok(Some(skipped));
                }
            }
        }
    }

    fn perform(
        &mut self,
        action: Action,
        child: &mut Child,
    ) -> Result<Option<(String, String)>, HarnessError> {
        match action {
            Action::ScheduleTermination { cause, .. } => match cause {
                TerminationCause::Stalled => self.log.event("Timed out"),
                TerminationCause::LimitReached => self.log.event("Reached limit"),
            },
            Action::SendSigterm => {
                self.log.event("Sending SIGTERM");
                if let Err(err) = request_stop(child) {
                    tracing::warn!(error = %err, "SIGTERM delivery failed");
                }
            }
            Action::SendSigkill => {
                if matches!(child.try_wait(), Ok(None)) {
                    self.log.event("Timeout on SIGTERM. Sending SIGKILL");
                    force_stop(child)?;
                }
            }
            Action::StartInjectors => {
                for injector in &mut self.injectors {
                    self.log.event(format!("Starting {}", injector.name()));
                    injector.start()?;
                }
            }
            Action::ApplyDeferredStaging => {
                if let Some(deferred) = self.deferred.take() {
                    for step in &deferred.instructions {
                        self.log.event(format!(
                            "{} {} to {}",
                            step.mode,
                            step.source.display(),
                            step.directory
                        ));
                    }
                    staging::apply(&deferred.layout, &deferred.instructions)?;
                }
            }
            Action::ProbePassed { probe } => self.log.event(format!("{probe}: available")),
            Action::Skip { probe, line } => {
                self.log.event(format!("{probe}: unavailable, skipping"));
                if let Err(err) = request_stop(child) {
                    tracing::warn!(error = %err, "SIGTERM delivery failed");
                }
                return Ok(Some((probe, strip_terminator(&line).to_string())));
            }
        }
        Ok(None)
    }

    /// Stop injectors, then reap the child, killing it if it lingers.
    async fn teardown(&mut self, child: &mut Child) -> Option<ChildExit> {
        for injector in &mut self.injectors {
            injector.stop();
        }

        let reap_wait = self.config.timeouts.reap_wait;
        let status = match timeout(reap_wait, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "failed to wait for daemon");
                None
            }
            Err(_elapsed) => {
                self.log.event("Daemon has not exited. Sending SIGKILL");
                if let Err(err) = force_stop(child) {
                    tracing::warn!(error = %err, "SIGKILL delivery failed");
                }
                if timeout(reap_wait, child.wait()).await.is_err() {
                    tracing::warn!("daemon still not reaped after SIGKILL");
                }
                None
            }
        };
        status.and_then(child_exit)
    }
}

fn child_exit(status: ExitStatus) -> Option<ChildExit> {
    if let Some(code) = status.code() {
        return Some(ChildExit::Code(code));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(ChildExit::Signal(signal));
        }
    }
    None
}
