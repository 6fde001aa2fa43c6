use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use flowprobe_core::targets::{bracketed, TcpTarget};

use crate::error::{io_err, HarnessError};
use crate::run_log::RunLog;

use super::{FaultSender, Injector, InjectorFault};

/// Bytes read from the source file per send cycle.
pub const TCP_CHUNK: usize = 2048;

/// Counters from one [`pump`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Successful write calls.
    pub writes: usize,
    pub bytes: u64,
    /// Send attempts that hit the send timeout and were retried.
    pub retries: usize,
    /// Whether the loop ended because the stop flag was raised.
    pub stopped: bool,
}

/// Connect to the first resolved candidate for `host:port` that accepts.
///
/// Candidates are tried in resolver order; each attempt is bounded by
/// `connect_timeout`. Failing to resolve counts as having no candidates.
pub async fn connect_any(
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<TcpStream, HarnessError> {
    let target = bracketed(host, port);
    let candidates = match lookup_host((host, port)).await {
        Ok(candidates) => candidates.collect::<Vec<_>>(),
        Err(err) => {
            tracing::debug!(%target, error = %err, "address resolution failed");
            Vec::new()
        }
    };

    for addr in candidates {
        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(err)) => tracing::debug!(%addr, error = %err, "connect failed"),
            Err(_) => tracing::debug!(%addr, "connect timed out"),
        }
    }
    Err(HarnessError::Unreachable { target })
}

/// Copy `source` to `sink` in [`TCP_CHUNK`] pieces until exhaustion or stop.
///
/// A write that exceeds `send_timeout` is retried with the same pending
/// bytes. Any other write error ends the pump.
pub async fn pump<R, W>(
    mut source: R,
    mut sink: W,
    stop: &AtomicBool,
    send_timeout: Duration,
) -> io::Result<PumpStats>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = PumpStats::default();
    let mut chunk = vec![0u8; TCP_CHUNK];

    loop {
        if stop.load(Ordering::Acquire) {
            stats.stopped = true;
            return Ok(stats);
        }
        let read = source.read(&mut chunk).await?;
        if read == 0 {
            return Ok(stats);
        }

        let mut pending = &chunk[..read];
        while !pending.is_empty() {
            if stop.load(Ordering::Acquire) {
                stats.stopped = true;
                return Ok(stats);
            }
            match timeout(send_timeout, sink.write(pending)).await {
                Err(_elapsed) => stats.retries += 1,
                Ok(Ok(0)) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(Ok(sent)) => {
                    pending = &pending[sent..];
                    stats.writes += 1;
                    stats.bytes += sent as u64;
                }
                Ok(Err(err)) => return Err(err),
            }
        }
    }
}

/// Replays a file over a TCP connection from a background task.
pub struct StreamInjector {
    target: TcpTarget,
    connect_timeout: Duration,
    send_timeout: Duration,
    log: RunLog,
    faults: FaultSender,
    stop: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl StreamInjector {
    pub fn new(
        target: TcpTarget,
        connect_timeout: Duration,
        send_timeout: Duration,
        log: RunLog,
        faults: FaultSender,
    ) -> Self {
        Self {
            target,
            connect_timeout,
            send_timeout,
            log,
            faults,
            stop: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

impl Injector for StreamInjector {
    fn name(&self) -> String {
        format!(
            "tcp {} -> {}",
            self.target.source.display(),
            bracketed(&self.target.address, self.target.port)
        )
    }

    fn start(&mut self) -> Result<(), HarnessError> {
        if self.task.is_some() {
            return Ok(());
        }
        let path = &self.target.source;
        let file = std::fs::File::open(path).map_err(|e| io_err(path, e))?;
        let file = tokio::fs::File::from_std(file);

        let name = self.name();
        let host = self.target.address.clone();
        let port = self.target.port;
        let connect_timeout = self.connect_timeout;
        let send_timeout = self.send_timeout;
        let log = self.log.clone();
        let faults = self.faults.clone();
        let stop = self.stop.clone();

        self.task = Some(tokio::spawn(async move {
            let target = bracketed(&host, port);
            let stream = match connect_any(&host, port, connect_timeout).await {
                Ok(stream) => stream,
                Err(err) => {
                    log.event(format!("Could not open connection to {target}"));
                    let _ = faults.send(InjectorFault {
                        injector: name,
                        message: err.to_string(),
                    });
                    return;
                }
            };
            log.event(format!("Connected to {target}"));

            match pump(file, stream, &stop, send_timeout).await {
                Ok(stats) => tracing::info!(
                    %target,
                    bytes = stats.bytes,
                    writes = stats.writes,
                    retries = stats.retries,
                    stopped = stats.stopped,
                    "tcp stream finished",
                ),
                Err(err) => log.event(format!("Error sending to {target}: {err}")),
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}
