//! Process Supervisor
//!
//! Owns the child process's stdin, stdout, stderr, and restart lifecycle
//! (§4.1). Spawning, stdio wiring, and the termination strategy are adapted
//! from the teacher's `StdioTransport::spawn` and `Drop` impl; restart
//! backoff and the lazy-start write path are new.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::{BridgeError, Result};

/// Sink for raw stdout byte chunks, fed directly to a [`crate::framing::FrameSplitter`].
pub type StdoutSink = mpsc::UnboundedSender<Vec<u8>>;
/// Sink for stderr lines, logged and otherwise ignored per §4.1.
pub type StderrSink = mpsc::UnboundedSender<String>;

const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);
const LAZY_START_WRITE_DELAY: Duration = Duration::from_millis(100);
const STDOUT_CHUNK_SIZE: usize = 8192;

/// Read-only snapshot of the supervisor's view of the child process.
#[derive(Debug, Clone, Default)]
pub struct ProcessState {
    /// Present iff the child is currently running.
    pub pid: Option<u32>,
    /// Whether a child is currently running.
    pub running: bool,
    /// Monotonic count of restarts since this supervisor was created.
    pub restart_count: u32,
    /// Timestamp of the most recent restart, if any.
    pub last_restart_at: Option<DateTime<Utc>>,
}

/// Message sent to the task that owns a live `Child`, asking it to
/// terminate the process (graceful signal, grace period, forceful kill)
/// and report back once it has exited.
struct StopRequest {
    reply: oneshot::Sender<()>,
}

struct ChildHandle {
    stdin: ChildStdin,
    stop_tx: mpsc::Sender<StopRequest>,
}

struct SupervisorState {
    child: Option<ChildHandle>,
    process: ProcessState,
    shutting_down: bool,
}

/// Supervises a single child process, restarting it with exponential
/// backoff on unexpected exit and exposing a serialized stdin write path.
///
/// ```no_run
/// # tokio_test::block_on(async {
/// use std::time::Duration;
/// use tokio::sync::mpsc;
/// use mcp_bridge::supervisor::ProcessSupervisor;
///
/// let (stdout_tx, _stdout_rx) = mpsc::unbounded_channel();
/// let (stderr_tx, _stderr_rx) = mpsc::unbounded_channel();
/// let supervisor = ProcessSupervisor::new(
///     "echo".to_string(),
///     vec![],
///     Duration::from_millis(100),
///     Duration::from_secs(30),
///     false,
///     stdout_tx,
///     stderr_tx,
/// );
/// supervisor.start().await?;
/// # Ok::<(), mcp_bridge::BridgeError>(())
/// # });
/// ```
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    command: String,
    args: Vec<String>,
    restart_backoff_base: Duration,
    restart_backoff_max: Duration,
    lazy_start: bool,
    stdout_sink: StdoutSink,
    stderr_sink: StderrSink,
    state: Mutex<SupervisorState>,
    /// Bumped on every explicit `Stop` and every `Start`; a scheduled restart
    /// compares against the value it captured before sleeping and aborts if
    /// it no longer matches, so a `Stop` (or a newer restart) cancels it.
    generation: AtomicU64,
}

impl ProcessSupervisor {
    /// Construct a new supervisor. The child is not spawned until [`Self::start`]
    /// is called (either directly, or implicitly by [`Self::write`] under
    /// lazy-start).
    pub fn new(
        command: String,
        args: Vec<String>,
        restart_backoff_base: Duration,
        restart_backoff_max: Duration,
        lazy_start: bool,
        stdout_sink: StdoutSink,
        stderr_sink: StderrSink,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                command,
                args,
                restart_backoff_base,
                restart_backoff_max,
                lazy_start,
                stdout_sink,
                stderr_sink,
                state: Mutex::new(SupervisorState {
                    child: None,
                    process: ProcessState::default(),
                    shutting_down: false,
                }),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Idempotent: returns immediately if a child is already running.
    pub async fn start(&self) -> Result<()> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.start_locked().await
    }

    /// Write a newline-terminated frame to child stdin.
    ///
    /// Under lazy-start, if no child is running this triggers [`Self::start`]
    /// and schedules the write after a short delay instead of failing; the
    /// caller's acceptance response is not blocked on it, and a `Start`
    /// failure (e.g. a bad command) is not surfaced to the caller either —
    /// it is logged and left to the ordinary restart-with-backoff path.
    /// Delivery is best-effort: a crash/restart racing the scheduled write
    /// can drop it.
    pub async fn write(&self, frame: String) -> Result<()> {
        let has_child = {
            let state = self.inner.state.lock().await;
            state.child.is_some()
        };

        if has_child {
            return self.inner.write_now(&frame).await;
        }

        if !self.inner.lazy_start {
            return Err(BridgeError::NotRunning);
        }

        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(err) = inner.start_locked().await {
                tracing::warn!(
                    target: "mcp_bridge::supervisor",
                    "lazy-start trigger failed: {err}"
                );
                return;
            }
            tokio::time::sleep(LAZY_START_WRITE_DELAY).await;
            if let Err(err) = inner.write_now(&frame).await {
                tracing::warn!(
                    target: "mcp_bridge::supervisor",
                    "lazy-start deferred write failed: {err}"
                );
            }
        });
        Ok(())
    }

    /// Clears any pending restart timer, terminates the child (graceful then
    /// forceful), and resolves once it has exited. Idempotent: calling `stop`
    /// with no running child is a no-op.
    pub async fn stop(&self) -> Result<()> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        let handle = {
            let mut state = self.inner.state.lock().await;
            state.shutting_down = true;
            state.child.take()
        };

        let Some(handle) = handle else {
            return Ok(());
        };

        // Dropping stdin closes the pipe, which many well-behaved servers
        // treat as a shutdown signal in its own right.
        drop(handle.stdin);

        let (reply_tx, reply_rx) = oneshot::channel();
        if handle.stop_tx.send(StopRequest { reply: reply_tx }).await.is_ok() {
            let _ = reply_rx.await;
        }

        let mut state = self.inner.state.lock().await;
        state.process.running = false;
        state.process.pid = None;
        Ok(())
    }

    /// Read-only snapshot of the current process state.
    pub async fn state(&self) -> ProcessState {
        self.inner.state.lock().await.process.clone()
    }

    /// Whether a child is currently running.
    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.process.running
    }
}

impl Inner {
    async fn start_locked(self: &Arc<Self>) -> Result<()> {
        {
            let state = self.state.lock().await;
            if state.child.is_some() {
                return Ok(());
            }
        }

        let mut cmd = build_command(&self.command, &self.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = BridgeError::ChildSpawnFailed {
                    command: self.command.clone(),
                    message: e.to_string(),
                };
                tracing::error!(target: "mcp_bridge::supervisor", "{err}");
                self.schedule_restart().await;
                return Err(err);
            }
        };

        let pid = match child.id() {
            Some(pid) => pid,
            None => {
                return Err(BridgeError::ChildSpawnFailed {
                    command: self.command.clone(),
                    message: "child exited immediately after spawn".to_string(),
                })
            }
        };

        let stdin = child.stdin.take().ok_or_else(|| BridgeError::ChildSpawnFailed {
            command: self.command.clone(),
            message: "stdin unavailable after spawn".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| BridgeError::ChildSpawnFailed {
            command: self.command.clone(),
            message: "stdout unavailable after spawn".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| BridgeError::ChildSpawnFailed {
            command: self.command.clone(),
            message: "stderr unavailable after spawn".to_string(),
        })?;

        let (stop_tx, stop_rx) = mpsc::channel::<StopRequest>(1);

        {
            let mut state = self.state.lock().await;
            state.child = Some(ChildHandle { stdin, stop_tx });
            state.process.pid = Some(pid);
            state.process.running = true;
            state.shutting_down = false;
        }

        spawn_stdout_reader(stdout, self.stdout_sink.clone());
        spawn_stderr_reader(stderr, self.stderr_sink.clone());

        let inner = Arc::clone(self);
        tokio::spawn(own_child(inner, child, pid, stop_rx));

        tracing::info!(target: "mcp_bridge::supervisor", "child process started, pid={pid}");
        Ok(())
    }

    async fn write_now(&self, frame: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.child.as_mut() {
            Some(handle) => {
                handle.stdin.write_all(frame.as_bytes()).await?;
                Ok(())
            }
            None => Err(BridgeError::NotRunning),
        }
    }

    async fn schedule_restart(self: &Arc<Self>) {
        let generation = self.generation.load(Ordering::SeqCst);
        let delay = {
            let mut state = self.state.lock().await;
            state.process.restart_count += 1;
            state.process.last_restart_at = Some(Utc::now());
            compute_backoff(
                state.process.restart_count,
                self.restart_backoff_base,
                self.restart_backoff_max,
            )
        };

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            if let Err(err) = inner.start_locked().await {
                tracing::error!(target: "mcp_bridge::supervisor", "restart attempt failed: {err}");
            }
        });
    }
}

/// The single task that owns a live `Child` for its entire lifetime: it
/// either observes the child exit on its own (triggering a restart unless
/// shutdown is in progress) or services a [`StopRequest`], whichever comes
/// first.
async fn own_child(inner: Arc<Inner>, mut child: Child, pid: u32, mut stop_rx: mpsc::Receiver<StopRequest>) {
    tokio::select! {
        status = child.wait() => {
            let mut state = inner.state.lock().await;
            state.child = None;
            state.process.running = false;
            state.process.pid = None;
            let shutting_down = state.shutting_down;
            drop(state);

            if shutting_down {
                return;
            }

            let needs_restart = !matches!(status, Ok(status) if status.success());
            if needs_restart {
                tracing::warn!(
                    target: "mcp_bridge::supervisor",
                    "child process (pid={pid}) exited unexpectedly: {status:?}"
                );
                inner.schedule_restart().await;
            }
        }
        Some(request) = stop_rx.recv() => {
            send_graceful_signal(pid, &mut child);
            let waited = tokio::time::timeout(STOP_GRACE_PERIOD, child.wait()).await;
            if waited.is_err() {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
            let _ = request.reply.send(());
        }
    }
}

fn spawn_stdout_reader(stdout: tokio::process::ChildStdout, sink: StdoutSink) {
    tokio::spawn(async move {
        let mut reader = stdout;
        let mut buf = vec![0u8; STDOUT_CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if sink.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
}

fn spawn_stderr_reader(stderr: tokio::process::ChildStderr, sink: StderrSink) {
    tokio::spawn(async move {
        let reader = BufReader::new(stderr);
        let mut lines = tokio::io::AsyncBufReadExt::lines(reader);
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "mcp_bridge::supervisor", "child stderr: {line}");
            if sink.send(line).is_err() {
                break;
            }
        }
    });
}

fn compute_backoff(restart_count: u32, base: Duration, max: Duration) -> Duration {
    let exponent = restart_count.saturating_sub(1);
    let scaled = base
        .checked_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX))
        .unwrap_or(max);
    scaled.min(max)
}

/// Build the `Command` for the configured tool. On platforms where
/// script-suffix executables (`.cmd`/`.bat`) are not directly executable,
/// the shell interpreter is used to invoke them; everywhere else, and for
/// every other command, the executable is run directly. `args` are always
/// passed as a literal argument vector, never interpolated into a shell
/// string.
fn build_command(command: &str, args: &[String]) -> Command {
    #[cfg(windows)]
    {
        let lower = command.to_ascii_lowercase();
        if lower.ends_with(".cmd") || lower.ends_with(".bat") {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command).args(args);
            return cmd;
        }
    }
    let mut cmd = Command::new(command);
    cmd.args(args);
    cmd
}

#[cfg(unix)]
fn send_graceful_signal(pid: u32, _child: &mut Child) {
    // SAFETY: pid was obtained from this same Child immediately after spawn.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_graceful_signal(_pid: u32, child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_cat_supervisor(lazy_start: bool) -> (ProcessSupervisor, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (err_tx, _err_rx) = mpsc::unbounded_channel();
        let supervisor = ProcessSupervisor::new(
            "cat".to_string(),
            vec![],
            Duration::from_millis(10),
            Duration::from_secs(1),
            lazy_start,
            out_tx,
            err_tx,
        );
        (supervisor, out_rx)
    }

    #[tokio::test]
    async fn test_start_spawns_and_sets_running() {
        let (supervisor, _out_rx) = new_cat_supervisor(false);
        supervisor.start().await.unwrap();
        assert!(supervisor.is_running().await);
        supervisor.stop().await.unwrap();
        assert!(!supervisor.is_running().await);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (supervisor, _out_rx) = new_cat_supervisor(false);
        supervisor.start().await.unwrap();
        let pid_first = supervisor.state().await.pid;
        supervisor.start().await.unwrap();
        let pid_second = supervisor.state().await.pid;
        assert_eq!(pid_first, pid_second);
        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_without_lazy_start_fails_when_not_running() {
        let (supervisor, _out_rx) = new_cat_supervisor(false);
        let result = supervisor.write("{}\n".to_string()).await;
        assert!(matches!(result, Err(BridgeError::NotRunning)));
    }

    #[tokio::test]
    async fn test_write_echoes_through_cat() {
        let (supervisor, mut out_rx) = new_cat_supervisor(false);
        supervisor.start().await.unwrap();
        supervisor.write("hello\n".to_string()).await.unwrap();

        let chunk = tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
            .await
            .expect("timed out waiting for echoed stdout")
            .expect("stdout channel closed");
        assert_eq!(chunk, b"hello\n".to_vec());

        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_lazy_start_write_starts_child() {
        let (supervisor, mut out_rx) = new_cat_supervisor(true);
        supervisor.write("lazy\n".to_string()).await.unwrap();

        let chunk = tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
            .await
            .expect("timed out waiting for echoed stdout")
            .expect("stdout channel closed");
        assert_eq!(chunk, b"lazy\n".to_vec());
        assert!(supervisor.is_running().await);

        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (supervisor, _out_rx) = new_cat_supervisor(false);
        supervisor.start().await.unwrap();
        supervisor.stop().await.unwrap();
        supervisor.stop().await.unwrap();
        assert!(!supervisor.is_running().await);
    }

    #[test]
    fn test_restart_backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(1);
        assert_eq!(compute_backoff(1, base, max), Duration::from_millis(100));
        assert_eq!(compute_backoff(2, base, max), Duration::from_millis(200));
        assert_eq!(compute_backoff(3, base, max), Duration::from_millis(400));
        assert_eq!(compute_backoff(4, base, max), Duration::from_millis(800));
        assert_eq!(compute_backoff(5, base, max), Duration::from_secs(1));
        assert_eq!(compute_backoff(10, base, max), Duration::from_secs(1));
    }
}
