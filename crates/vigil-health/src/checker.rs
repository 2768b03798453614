//! Health check probe logic.
//!
//! Runs a single command, HTTP or TCP probe against a task with an enforced
//! timeout. Probes never return errors: spawn failures, transport errors and
//! timeouts all fold into an unhealthy [`ProbeOutcome`]. Every resource a
//! probe acquires (child process, socket, connection driver) is released
//! before the outcome is returned or when the probe future is dropped.

use std::future::Future;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use vigil_core::{CheckPayload, CommandCheck, HttpCheck, HttpScheme};

use crate::tls;

/// Result of a single health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    healthy: bool,
    timed_out: bool,
    error: Option<String>,
    observed_at: SystemTime,
}

impl ProbeOutcome {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            timed_out: false,
            error: None,
            observed_at: SystemTime::now(),
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            timed_out: false,
            error: Some(error.into()),
            observed_at: SystemTime::now(),
        }
    }

    pub fn timed_out(timeout: Duration) -> Self {
        Self {
            healthy: false,
            timed_out: true,
            error: Some(format!("timed out after {timeout:?}")),
            observed_at: SystemTime::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn observed_at(&self) -> SystemTime {
        self.observed_at
    }
}

/// Something that can probe a task's health.
///
/// The monitor loop calls `probe` once per tick and never overlaps calls.
/// Dropping the returned future must cancel the probe.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, timeout: Duration) -> impl Future<Output = ProbeOutcome> + Send;
}

/// Prober that runs a validated health check payload.
#[derive(Debug, Clone)]
pub struct CheckProber {
    check: CheckPayload,
}

impl CheckProber {
    pub fn new(check: CheckPayload) -> Self {
        Self { check }
    }
}

impl Prober for CheckProber {
    async fn probe(&self, timeout: Duration) -> ProbeOutcome {
        execute(&self.check, timeout).await
    }
}

/// Run one probe of the given kind.
pub async fn execute(check: &CheckPayload, timeout: Duration) -> ProbeOutcome {
    match check {
        CheckPayload::Command(cmd) => command_probe(cmd, timeout).await,
        CheckPayload::Http(http) => http_probe(http, timeout).await,
        CheckPayload::Tcp(tcp) => tcp_probe(tcp.port, timeout).await,
    }
}

// ── Command ───────────────────────────────────────────────────────

/// Run a command probe. Exit code 0 is healthy.
///
/// The child runs in its own process group so that a timeout kills
/// everything it started, not just the top-level shell.
pub async fn command_probe(check: &CommandCheck, timeout: Duration) -> ProbeOutcome {
    let mut cmd = build_command(check);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            debug!(error = %e, command = %check.value, "health command spawn failed");
            return ProbeOutcome::unhealthy(format!("failed to run '{}': {e}", check.value));
        }
    };
    let pid = child.id();
    let stderr = child
        .stderr
        .take()
        .map(|pipe| StderrCapture::spawn(pipe, MAX_STDERR_BYTES));

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) if status.success() => ProbeOutcome::healthy(),
        Ok(Ok(status)) => {
            let status = match status.code() {
                Some(code) => format!("exit status = {code}"),
                None => format!("terminated ({status})"),
            };
            let stderr = match stderr {
                Some(capture) => capture.finish(STDERR_DRAIN).await,
                None => String::new(),
            };
            debug!(command = %check.value, %status, "health command failed");
            ProbeOutcome::unhealthy(format!(
                "'{}' failed: {status} stderr = {}",
                check.value,
                stderr.trim()
            ))
        }
        Ok(Err(e)) => ProbeOutcome::unhealthy(format!("failed to wait for '{}': {e}", check.value)),
        Err(_) => {
            debug!(command = %check.value, ?timeout, "health command timed out");
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            if let Err(e) = child.kill().await {
                warn!(error = %e, command = %check.value, "failed to kill timed out health command");
            }
            ProbeOutcome::timed_out(timeout)
        }
    }
}

/// Most stderr kept for a failure diagnostic. The rest is read and dropped.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// How long to keep reading stderr after the command exits. Processes the
/// command left running may hold the pipe open indefinitely.
const STDERR_DRAIN: Duration = Duration::from_millis(100);

/// Reads a child's stderr in the background into a capped buffer.
struct StderrCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: AbortOnDrop<()>,
}

impl StderrCapture {
    fn spawn<R>(mut pipe: R, cap: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = buf.clone();
        let reader = tokio::spawn(async move {
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let Ok(mut buf) = sink.lock() else { break };
                        let room = cap.saturating_sub(buf.len());
                        buf.extend_from_slice(&chunk[..n.min(room)]);
                    }
                }
            }
        });
        Self {
            buf,
            reader: AbortOnDrop(reader),
        }
    }

    /// Wait up to `drain` for end of stream, then return what was read.
    async fn finish(mut self, drain: Duration) -> String {
        let _ = tokio::time::timeout(drain, &mut self.reader.0).await;
        let bytes = match self.buf.lock() {
            Ok(buf) => buf.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Build the child command.
///
/// Shell commands run through `/bin/sh -c`. Otherwise `value` is the program
/// and `arguments` is its full argv, `arguments[0]` being argv[0].
fn build_command(check: &CommandCheck) -> Command {
    let mut cmd = if check.shell {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(&check.value);
        cmd
    } else {
        let mut cmd = Command::new(&check.value);
        if let Some((argv0, args)) = check.arguments.split_first() {
            cmd.arg0(argv0).args(args);
        }
        cmd
    };
    cmd.envs(&check.environment);
    cmd
}

fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

// ── HTTP ──────────────────────────────────────────────────────────

/// Perform an HTTP(S) probe against `localhost:<port><path>`.
///
/// Any response counts as healthy; the status code is only logged.
/// Connection, TLS and protocol errors are unhealthy.
pub async fn http_probe(check: &HttpCheck, timeout: Duration) -> ProbeOutcome {
    let url = check.url();

    match tokio::time::timeout(timeout, http_request(check)).await {
        Ok(Ok(status)) => {
            debug!(%status, %url, "health probe got response");
            ProbeOutcome::healthy()
        }
        Ok(Err(e)) => {
            debug!(error = %e, %url, "health probe request failed");
            ProbeOutcome::unhealthy(format!("{url}: {e}"))
        }
        Err(_) => {
            debug!(%url, "health probe timed out");
            ProbeOutcome::timed_out(timeout)
        }
    }
}

async fn http_request(check: &HttpCheck) -> anyhow::Result<http::StatusCode> {
    let stream = TcpStream::connect(("localhost", check.port)).await?;

    match check.scheme {
        HttpScheme::Http => send_get(stream, check).await,
        HttpScheme::Https => {
            let connector = tls::connector()?;
            let domain = rustls::pki_types::ServerName::try_from("localhost")?;
            let stream = connector.connect(domain, stream).await?;
            send_get(stream, check).await
        }
    }
}

async fn send_get<S>(io: S, check: &HttpCheck) -> anyhow::Result<http::StatusCode>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(io);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    // Drive the connection in the background until the response arrives.
    let _driver = AbortOnDrop(tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "health probe connection closed");
        }
    }));

    let req = http::Request::builder()
        .method("GET")
        .uri(check.path())
        .header(HOST, format!("localhost:{}", check.port))
        .header(USER_AGENT, "vigil-health/0.1")
        .body(Empty::<Bytes>::new())?;

    let resp = sender.send_request(req).await?;
    Ok(resp.status())
}

/// Aborts the wrapped task when dropped, closing whatever it owns.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ── TCP ───────────────────────────────────────────────────────────

/// Attempt a TCP connection to `localhost:<port>`.
pub async fn tcp_probe(port: u16, timeout: Duration) -> ProbeOutcome {
    match tokio::time::timeout(timeout, TcpStream::connect(("localhost", port))).await {
        Ok(Ok(_stream)) => ProbeOutcome::healthy(),
        Ok(Err(e)) => {
            debug!(error = %e, port, "tcp health probe failed");
            ProbeOutcome::unhealthy(format!("connect to localhost:{port} failed: {e}"))
        }
        Err(_) => {
            debug!(port, "tcp health probe timed out");
            ProbeOutcome::timed_out(timeout)
        }
    }
}
