//! `flowprobe run` — one supervised daemon run, start to verdict.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use flowprobe_core::{
    DaemonRole, HarnessConfig, LaunchOptions, PatternSet, PduTarget, StagingInstruction,
    StagingMode, TcpTarget,
};
use flowprobe_harness::{
    run_blocking, staging, GeneratorCommand, RecordInjector, RunLog, RunOutcome, StreamInjector,
    Supervisor, SupervisorConfig,
};

/// Arguments for `flowprobe run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Daemon role: flowpack, flowappend, or flowcap.
    pub role: DaemonRole,

    /// Daemon command line; defaults to the role's environment variable.
    #[arg(long)]
    pub program: Option<String>,

    /// Send COUNT generated records to ADDRESS:PORT once the daemon is ready.
    #[arg(long, value_name = "COUNT,ADDRESS,PORT")]
    pub pdu: Vec<PduTarget>,

    /// Stream FILE to ADDRESS:PORT once the daemon is ready.
    #[arg(long, value_name = "FILE,ADDRESS,PORT")]
    pub tcp: Vec<TcpTarget>,

    /// Copy FILE into a staged directory before launch.
    #[arg(long, value_name = "FILE:DIR")]
    pub copy: Vec<String>,

    /// Move FILE into a staged directory before launch.
    #[arg(long = "move", value_name = "FILE:DIR")]
    pub move_files: Vec<String>,

    /// Copy FILE into a staged directory once the daemon is ready.
    #[arg(long, value_name = "FILE:DIR")]
    pub copy_after: Vec<String>,

    /// Move FILE into a staged directory once the daemon is ready.
    #[arg(long, value_name = "FILE:DIR")]
    pub move_after: Vec<String>,

    #[arg(long)]
    pub input_mode: Option<String>,

    #[arg(long)]
    pub output_mode: Option<String>,

    /// Directory holding the staged directories; a temporary one by default.
    #[arg(long)]
    pub basedir: Option<PathBuf>,

    /// Empty staged directories that already exist.
    #[arg(long)]
    pub overwrite_dirs: bool,

    /// Seconds without progress before the daemon is stopped.
    #[arg(long, value_name = "SECS")]
    pub daemon_timeout: Option<f64>,

    /// Expected number of records; reaching it stops the daemon.
    #[arg(long)]
    pub limit: Option<u64>,

    /// Sensor configuration template rendered against the staged directories.
    #[arg(long)]
    pub sensor_configuration: Option<PathBuf>,

    /// Daemon flush (flowpack) or file (flowcap) timeout.
    #[arg(long = "flush-timeout", visible_alias = "timeout", default_value_t = 10)]
    pub role_timeout: u64,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Harness config file with timeout and pattern overrides.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Record generator command used by --pdu.
    #[arg(long)]
    pub generator: Option<String>,

    /// Verbose harness diagnostics on stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit harness diagnostics as JSON lines.
    #[arg(long)]
    pub log_json: bool,

    /// Extra daemon arguments, placed before the harness-managed flags.
    #[arg(last = true)]
    pub extra: Vec<String>,
}

impl RunArgs {
    pub fn run(self) -> Result<ExitCode> {
        flowprobe_harness::init_tracing(self.verbose, self.log_json);

        let config = match &self.config {
            Some(path) => HarnessConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => HarnessConfig::default(),
        };
        let mut profile = self.role.profile();
        profile.patterns.apply(&config.patterns);
        let patterns = PatternSet::compile(&profile.patterns).context("invalid line pattern")?;

        let mut timeouts = config.timeouts;
        if let Some(secs) = self.daemon_timeout {
            timeouts.daemon = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("invalid --daemon-timeout {secs}"))?;
        }

        let before = instructions(&self.copy, &self.move_files)?;
        let after = instructions(&self.copy_after, &self.move_after)?;
        let needs_ready = !self.pdu.is_empty() || !self.tcp.is_empty() || !after.is_empty();
        if needs_ready && !patterns.has_ready() {
            bail!(
                "role {} has no ready marker; --pdu, --tcp, --copy-after and --move-after need one",
                self.role
            );
        }

        let layout = staging::create_layout(
            self.basedir.as_deref(),
            &profile.directories,
            self.overwrite_dirs,
        )
        .context("failed to stage directories")?;
        let log_path = layout.path("log")?.join(&profile.log_file);
        let label = Path::new(&profile.log_file)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| profile.role.to_string());
        let log = RunLog::create(&log_path, label)
            .with_context(|| format!("failed to create {}", log_path.display()))?;

        let sensor_configuration = match &self.sensor_configuration {
            Some(template) => Some(
                staging::render_config(template, &layout)
                    .with_context(|| format!("failed to render {}", template.display()))?,
            ),
            None => None,
        };
        let options = LaunchOptions {
            log_level: self.log_level.clone(),
            role_timeout: self.role_timeout,
            input_mode: self.input_mode.clone(),
            output_mode: self.output_mode.clone(),
            sensor_configuration,
            extra_args: self.extra.clone(),
        };
        let program = profile.resolve_program(self.program.as_deref());
        let argv = profile
            .daemon_argv(&program, &options, &layout)
            .context("failed to build daemon command line")?;

        for step in &before {
            log.event(format!("{} {} to {}", step.mode, step.source.display(), step.directory));
        }
        staging::apply(&layout, &before).context("failed to stage files")?;

        let mut supervisor = Supervisor::new(
            SupervisorConfig {
                argv,
                patterns,
                limit: profile.expected_count(self.limit, before.len()),
                timeouts,
                unit: profile.unit,
            },
            log.clone(),
        );

        let generator = self
            .generator
            .as_deref()
            .map(GeneratorCommand::new)
            .unwrap_or_else(GeneratorCommand::from_env);
        for target in self.pdu {
            supervisor.add_injector(Box::new(RecordInjector::new(
                target,
                generator.clone(),
                log.clone(),
            )));
        }
        for target in self.tcp {
            let injector = StreamInjector::new(
                target,
                timeouts.connect,
                timeouts.send,
                log.clone(),
                supervisor.fault_sender(),
            );
            supervisor.add_injector(Box::new(injector));
        }
        supervisor.defer_staging(layout, after);

        let report = match run_blocking(supervisor) {
            Ok(report) => report,
            Err(err) => {
                log.event(format!("Exiting: {err}"));
                return Err(err).context("daemon run failed");
            }
        };

        match &report.outcome {
            RunOutcome::Skipped { probe, line } => {
                let message = format!("SKIP: {probe}: {line}");
                println!("{}", message.yellow());
                log.event(message);
            }
            RunOutcome::Completed(verdict) => {
                for line in verdict.reduce().lines {
                    if line.starts_with("ERROR:") {
                        println!("{}", line.red());
                    } else {
                        println!("{line}");
                    }
                    log.raw(line.as_bytes());
                }
                match verdict.child_exit {
                    Some(exit) => log.event(format!("Exiting: Daemon returned {}", exit.status())),
                    None => log.event("Exiting: Daemon did not appear to terminate normally"),
                }
            }
        }

        let code = u8::try_from(report.exit_code()).unwrap_or(u8::MAX);
        Ok(ExitCode::from(code))
    }
}

fn instructions(copies: &[String], moves: &[String]) -> Result<Vec<StagingInstruction>> {
    let copies = copies
        .iter()
        .map(|spec| StagingInstruction::parse(StagingMode::Copy, spec));
    let moves = moves
        .iter()
        .map(|spec| StagingInstruction::parse(StagingMode::Move, spec));
    copies
        .chain(moves)
        .collect::<Result<Vec<_>, _>>()
        .context("invalid staging instruction")
}
