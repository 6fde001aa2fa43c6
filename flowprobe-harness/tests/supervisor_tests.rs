//! End-to-end supervision against small `sh` stand-in daemons.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use flowprobe_core::{
    ChildExit, CountUnit, DaemonRole, PatternSet, PatternSpec, ProbeSpec, StagingInstruction,
    StagingMode, TcpTarget, Timeouts,
};
use flowprobe_harness::{
    ephemeral_port, staging, HarnessError, Injector, RunLog, RunOutcome, StreamInjector,
    Supervisor, SupervisorConfig,
};

fn fast_timeouts() -> Timeouts {
    Timeouts {
        poll: Duration::from_millis(100),
        daemon: Duration::from_secs(10),
        limit_delay: Duration::ZERO,
        kill_grace: Duration::from_secs(5),
        reap_wait: Duration::from_secs(2),
        connect: Duration::from_secs(1),
        send: Duration::from_secs(1),
    }
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn flowpack_config(script: &str, limit: Option<u64>, timeouts: Timeouts) -> SupervisorConfig {
    SupervisorConfig {
        argv: sh(script),
        patterns: PatternSet::compile(&DaemonRole::Flowpack.profile().patterns).unwrap(),
        limit,
        timeouts,
        unit: CountUnit::Records,
    }
}

/// Counts `start` and `stop` calls.
struct CountingInjector {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl Injector for CountingInjector {
    fn name(&self) -> String {
        "counting".to_string()
    }

    fn start(&mut self) -> Result<(), HarnessError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn limit_reached_then_clean_exit() {
    let script = r#"
        trap 'echo "Stopped logging" >&2; exit 0' TERM
        echo "rwflowpack: /data/in/f1: 500 recs" >&2
        echo "rwflowpack: /data/in/f2: 500 recs" >&2
        while true; do sleep 0.1; done
    "#;
    let log = RunLog::in_memory("flowpack-daemon");
    let supervisor = Supervisor::new(flowpack_config(script, Some(1000), fast_timeouts()), log.clone());

    let report = supervisor.run().await.expect("run");
    let RunOutcome::Completed(verdict) = &report.outcome else {
        panic!("unexpected outcome {:?}", report.outcome);
    };
    assert_eq!(verdict.observed, 1000);
    assert!(verdict.clean_shutdown);
    assert_eq!(verdict.child_exit, Some(ChildExit::Code(0)));
    assert_eq!(report.exit_code(), 0);
    assert_eq!(verdict.reduce().lines, vec!["Record count: 1000"]);

    let contents = log.contents();
    assert!(contents.contains("Reached limit"), "{contents}");
    assert!(contents.contains("Sending SIGTERM"), "{contents}");
    assert!(contents.contains("rwflowpack: /data/in/f2: 500 recs\n"), "{contents}");
    assert!(!contents.contains("SIGKILL"), "{contents}");
}

#[tokio::test]
async fn hung_daemon_is_killed_after_grace() {
    let script = r#"
        trap '' TERM
        echo "starting" >&2
        while true; do sleep 0.1; done
    "#;
    let timeouts = Timeouts {
        daemon: Duration::from_millis(300),
        kill_grace: Duration::from_millis(300),
        ..fast_timeouts()
    };
    let log = RunLog::in_memory("flowpack-daemon");
    let supervisor = Supervisor::new(flowpack_config(script, None, timeouts), log.clone());

    let report = supervisor.run().await.expect("run");
    let RunOutcome::Completed(verdict) = &report.outcome else {
        panic!("unexpected outcome {:?}", report.outcome);
    };
    assert!(!verdict.clean_shutdown);
    assert_eq!(verdict.child_exit, Some(ChildExit::Signal(9)));
    assert_eq!(report.exit_code(), 137);
    assert!(verdict
        .reduce()
        .lines
        .contains(&"ERROR: shutdown was not clean".to_string()));

    let contents = log.contents();
    let term = contents.find("Sending SIGTERM").expect("SIGTERM logged");
    let kill = contents
        .find("Timeout on SIGTERM. Sending SIGKILL")
        .expect("SIGKILL logged");
    assert!(term < kill);
    assert!(contents.contains("Timed out"));
}

#[tokio::test]
async fn repeated_ready_lines_start_injectors_once() {
    let script = r#"
        echo "Starting flush timer" >&2
        echo "Starting flush timer" >&2
        echo "Starting flush timer" >&2
        echo "Stopped logging" >&2
    "#;
    let starts = Arc::new(AtomicUsize::new(0));
    let stops = Arc::new(AtomicUsize::new(0));
    let mut supervisor = Supervisor::new(
        flowpack_config(script, None, fast_timeouts()),
        RunLog::in_memory("flowpack-daemon"),
    );
    supervisor.add_injector(Box::new(CountingInjector {
        starts: starts.clone(),
        stops: stops.clone(),
    }));

    let report = supervisor.run().await.expect("run");
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(report.state.triggers_fired, 1);
    assert!(report.state.network_started);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn injectors_are_stopped_even_when_never_started() {
    let stops = Arc::new(AtomicUsize::new(0));
    let mut supervisor = Supervisor::new(
        flowpack_config("echo 'Stopped logging' >&2", None, fast_timeouts()),
        RunLog::in_memory("flowpack-daemon"),
    );
    supervisor.add_injector(Box::new(CountingInjector {
        starts: Arc::new(AtomicUsize::new(0)),
        stops: stops.clone(),
    }));

    supervisor.run().await.expect("run");
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_stream_target_aborts_the_run() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("flows.bin");
    std::fs::write(&source, vec![7u8; 4096]).unwrap();
    let port = ephemeral_port().unwrap();

    let pid_file = dir.path().join("daemon.pid");
    let script = format!(
        r#"
        echo $$ > {}
        echo "Starting flush timer" >&2
        while true; do sleep 0.1; done
    "#,
        pid_file.display()
    );
    let log = RunLog::in_memory("flowpack-daemon");
    let mut supervisor =
        Supervisor::new(flowpack_config(&script, None, fast_timeouts()), log.clone());
    let target = TcpTarget {
        source,
        address: "127.0.0.1".to_string(),
        port,
    };
    let injector = StreamInjector::new(
        target,
        Duration::from_secs(1),
        Duration::from_secs(1),
        log.clone(),
        supervisor.fault_sender(),
    );
    supervisor.add_injector(Box::new(injector));

    let started = Instant::now();
    let err = supervisor.run().await.expect_err("fault must abort");
    assert!(matches!(err, HarnessError::Injector { .. }), "{err}");
    assert!(started.elapsed() < Duration::from_secs(8));

    let contents = log.contents();
    assert!(
        contents.contains(&format!("Could not open connection to [127.0.0.1]:{port}")),
        "{contents}"
    );
    assert_child_reaped(&pid_file);
}

#[cfg(unix)]
fn assert_child_reaped(pid_file: &std::path::Path) {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let pid: i32 = std::fs::read_to_string(pid_file)
        .expect("pid file")
        .trim()
        .parse()
        .expect("numeric pid");
    assert_eq!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH));
}

#[cfg(not(unix))]
fn assert_child_reaped(_pid_file: &std::path::Path) {}

#[tokio::test]
async fn child_output_is_logged_byte_for_byte() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flowpack-daemon.log");
    let log = RunLog::create(&path, "flowpack-daemon").unwrap();
    let script = r"printf 'caf\351 \377\n' >&2; echo 'Stopped logging' >&2";

    Supervisor::new(flowpack_config(script, None, fast_timeouts()), log)
        .run()
        .await
        .expect("run");

    let written = std::fs::read(&path).unwrap();
    let expected: &[u8] = b"caf\xe9 \xff\nStopped logging\n";
    assert!(
        written.windows(expected.len()).any(|w| w == expected),
        "{written:?}"
    );
}

#[tokio::test]
async fn failed_probe_skips_the_run() {
    let spec = PatternSpec {
        probe: Some(ProbeSpec {
            name: "ipfix".to_string(),
            success: "IPFIX support enabled".to_string(),
            failure: "IPFIX support not available".to_string(),
        }),
        ..DaemonRole::Flowpack.profile().patterns
    };
    let config = SupervisorConfig {
        argv: sh("echo 'IPFIX support not available' >&2; while true; do sleep 0.1; done"),
        patterns: PatternSet::compile(&spec).unwrap(),
        limit: Some(10),
        timeouts: fast_timeouts(),
        unit: CountUnit::Records,
    };

    let report = Supervisor::new(config, RunLog::in_memory("flowpack-daemon"))
        .run()
        .await
        .expect("run");
    assert_eq!(
        report.outcome,
        RunOutcome::Skipped {
            probe: "ipfix".to_string(),
            line: "IPFIX support not available".to_string(),
        }
    );
    assert_eq!(report.exit_code(), 77);
}

#[tokio::test]
async fn deferred_staging_runs_when_ready() {
    let dir = TempDir::new().unwrap();
    let layout = staging::create_layout(
        Some(&dir.path().join("stage")),
        &["incoming".to_string()],
        false,
    )
    .unwrap();
    let source = dir.path().join("late.rw");
    std::fs::write(&source, b"late").unwrap();

    let script = r#"
        echo "Starting flush timer" >&2
        sleep 0.3
        echo "Stopped logging" >&2
    "#;
    let mut supervisor = Supervisor::new(
        flowpack_config(script, None, fast_timeouts()),
        RunLog::in_memory("flowpack-daemon"),
    );
    supervisor.defer_staging(
        layout.clone(),
        vec![StagingInstruction {
            mode: StagingMode::Move,
            source: source.clone(),
            directory: "incoming".to_string(),
        }],
    );

    supervisor.run().await.expect("run");
    assert!(!source.exists());
    assert!(layout.path("incoming").unwrap().join("late.rw").exists());
}

#[tokio::test]
async fn daemon_that_cannot_start_is_an_error() {
    let config = SupervisorConfig {
        argv: vec!["/nonexistent/flowprobe-daemon".to_string()],
        ..flowpack_config("true", None, fast_timeouts())
    };
    let err = Supervisor::new(config, RunLog::in_memory("p"))
        .run()
        .await
        .expect_err("spawn must fail");
    assert!(matches!(err, HarnessError::Spawn { .. }), "{err}");
}

#[tokio::test]
async fn exit_without_clean_marker_keeps_child_status() {
    let report = Supervisor::new(
        flowpack_config("echo 'x: /in/f: 3 recs' >&2; exit 4", Some(5), fast_timeouts()),
        RunLog::in_memory("p"),
    )
    .run()
    .await
    .expect("run");
    let RunOutcome::Completed(verdict) = &report.outcome else {
        panic!("unexpected outcome {:?}", report.outcome);
    };
    assert_eq!(report.exit_code(), 4);
    assert_eq!(
        verdict.reduce().lines,
        vec![
            "Record count: 3",
            "ERROR: expecting 5 records, got 3 records",
            "ERROR: shutdown was not clean",
        ]
    );
}
