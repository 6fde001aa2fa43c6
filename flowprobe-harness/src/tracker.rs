//! Progress tracking and the shutdown escalation state machine.
//!
//! [`ProgressTracker`] is fed one optional line per supervisor tick together
//! with the current instant and answers with the [`Action`]s the supervisor
//! must perform. It never touches the process or the clock itself, so each
//! transition is reproducible from a list of `(line, instant)` pairs.
//!
//! Escalation runs `Running → SigtermScheduled → SigtermSent → SigkillSent`,
//! and the supervisor closes it with [`ProgressTracker::mark_reaped`].

use std::time::Duration;

use tokio::time::Instant;

use flowprobe_core::{PatternSet, ProbeResult, Timeouts};

/// Why termination was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// No progress within the daemon timeout.
    Stalled,
    /// The observed count reached the expected limit.
    LimitReached,
}

/// Escalation phase. Each variant carries the timestamps it depends on, so
/// a SIGKILL can only ever follow a recorded SIGTERM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Running,
    SigtermScheduled {
        due: Instant,
        cause: TerminationCause,
    },
    SigtermSent {
        at: Instant,
    },
    SigkillSent {
        sigterm_at: Instant,
        at: Instant,
    },
    Reaped,
}

/// Work the supervisor must carry out after a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Termination was scheduled for `due`.
    ScheduleTermination {
        cause: TerminationCause,
        due: Instant,
    },
    /// The ready marker matched for the first time.
    StartInjectors,
    ApplyDeferredStaging,
    SendSigterm,
    /// The grace window after SIGTERM elapsed.
    SendSigkill,
    ProbePassed {
        probe: String,
    },
    /// The optional capability is missing; the run cannot validly continue.
    Skip {
        probe: String,
        line: String,
    },
}

/// Mutable supervisor state, owned by the single supervising task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    /// Units counted from progress lines.
    pub observed: u64,
    /// One-shot triggers that have fired.
    pub triggers_fired: u32,
    pub network_started: bool,
    pub probe: Option<ProbeResult>,
    pub clean_shutdown: bool,
    pub last_progress: Instant,
    pub escalation: Escalation,
}

pub struct ProgressTracker {
    patterns: PatternSet,
    limit: Option<u64>,
    daemon_timeout: Duration,
    limit_delay: Duration,
    kill_grace: Duration,
    state: ProgressState,
}

impl ProgressTracker {
    /// `started` is the launch instant; the stall timer runs from it.
    pub fn new(
        patterns: PatternSet,
        limit: Option<u64>,
        timeouts: &Timeouts,
        started: Instant,
    ) -> Self {
        Self {
            patterns,
            limit,
            daemon_timeout: timeouts.daemon,
            limit_delay: timeouts.limit_delay,
            kill_grace: timeouts.kill_grace,
            state: ProgressState {
                observed: 0,
                triggers_fired: 0,
                network_started: false,
                probe: None,
                clean_shutdown: false,
                last_progress: started,
                escalation: Escalation::Running,
            },
        }
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    /// Advance by one tick. `line` is `None` when the read timed out.
    pub fn observe(&mut self, line: Option<&str>, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();

        if now.duration_since(self.state.last_progress) > self.daemon_timeout {
            self.schedule(TerminationCause::Stalled, now, &mut actions);
        }

        if let Some(line) = line {
            self.match_line(line, now, &mut actions);
        }

        match self.state.escalation {
            Escalation::SigtermScheduled { due, .. } if now >= due => {
                self.state.escalation = Escalation::SigtermSent { at: now };
                actions.push(Action::SendSigterm);
            }
            Escalation::SigtermSent { at } if now.duration_since(at) > self.kill_grace => {
                self.state.escalation = Escalation::SigkillSent {
                    sigterm_at: at,
                    at: now,
                };
                actions.push(Action::SendSigkill);
            }
            _ => {}
        }

        actions
    }

    /// The child has exited and been waited on.
    pub fn mark_reaped(&mut self) {
        self.state.escalation = Escalation::Reaped;
    }

    fn match_line(&mut self, line: &str, now: Instant, actions: &mut Vec<Action>) {
        if let Some(count) = self.patterns.progress_count(line) {
            if count > 0 {
                self.state.observed = self.state.observed.saturating_add(count);
                self.state.last_progress = now;
                if self.limit.is_some_and(|limit| self.state.observed >= limit) {
                    self.schedule(TerminationCause::LimitReached, now, actions);
                }
            }
        }

        if !self.state.network_started && self.patterns.is_ready(line) {
            self.state.network_started = true;
            self.state.triggers_fired += 1;
            actions.push(Action::StartInjectors);
            actions.push(Action::ApplyDeferredStaging);
        }

        if self.patterns.is_clean_shutdown(line) {
            self.state.clean_shutdown = true;
        }

        if self.state.probe.is_none() {
            if let Some(result) = self.patterns.probe_result(line) {
                self.state.probe = Some(result);
                self.state.triggers_fired += 1;
                let probe = self.patterns.probe_name().unwrap_or("probe").to_string();
                actions.push(match result {
                    ProbeResult::Passed => Action::ProbePassed { probe },
                    ProbeResult::Failed => Action::Skip {
                        probe,
                        line: line.to_string(),
                    },
                });
            }
        }
    }

    fn schedule(&mut self, cause: TerminationCause, now: Instant, actions: &mut Vec<Action>) {
        if self.state.escalation != Escalation::Running {
            return;
        }
        let delay = match cause {
            TerminationCause::Stalled => Duration::ZERO,
            TerminationCause::LimitReached => self.limit_delay,
        };
        let due = now + delay;
        self.state.escalation = Escalation::SigtermScheduled { due, cause };
        actions.push(Action::ScheduleTermination { cause, due });
    }
}
