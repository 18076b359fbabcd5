//! Server process lifecycle management.
//!
//! Handles spawning and shutting down the MCP server child process, and
//! collecting its stderr in the background so diagnostics are available
//! when the server dies.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::errors::McpError;
use super::transport::StdioTransport;
use super::types::ServerConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for graceful shutdown before force-killing.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ─── StderrCapture ───────────────────────────────────────────────────────────

/// Background reader that drains a stream (the server's stderr) into memory.
///
/// Draining continuously keeps a chatty server from blocking on a full pipe.
pub struct StderrCapture {
    buffer: Arc<Mutex<String>>,
    task: Option<JoinHandle<()>>,
}

impl StderrCapture {
    /// Start draining `stream` on a tokio task.
    pub fn spawn<R>(server_name: &str, stream: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let buffer = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&buffer);
        let server = server_name.to_string();

        let task = tokio::spawn(async move {
            let mut reader = BufReader::new(stream);
            let mut raw = Vec::new();
            loop {
                raw.clear();
                match reader.read_until(b'\n', &mut raw).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let chunk = String::from_utf8_lossy(&raw);
                        tracing::debug!(server = %server, line = %chunk.trim_end(), "server stderr");
                        if let Ok(mut buf) = sink.lock() {
                            buf.push_str(&chunk);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(server = %server, error = %e, "stderr read failed");
                        break;
                    }
                }
            }
        });

        Self {
            buffer,
            task: Some(task),
        }
    }

    /// Wait up to `grace` for the stream to end, then return everything read so far.
    pub async fn collect(&mut self, grace: Duration) -> String {
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                // Still open (process alive but stdout closed); keep what we have.
                task.abort();
            }
        }
        self.snapshot()
    }

    /// Everything read so far, without waiting.
    pub fn snapshot(&self) -> String {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }
}

// ─── ManagedProcess ──────────────────────────────────────────────────────────

/// A running MCP server process.
pub struct ManagedProcess {
    /// Short server label used in logs (e.g., "docker", "java").
    pub name: String,
    process: Child,
    shutdown_timeout: Duration,
    /// Set once the process has been observed to exit (or could not be reaped).
    finished: bool,
}

impl ManagedProcess {
    /// Spawn the server and wire a transport to its stdio.
    ///
    /// stderr is piped into a [`StderrCapture`] attached to the transport.
    pub fn spawn(config: &ServerConfig) -> Result<(ManagedProcess, StdioTransport), McpError> {
        let name = config.label();
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);

        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(dir) = config.cwd.as_deref() {
            cmd.current_dir(dir);
        }

        // Windows: prevent console window from appearing for child processes
        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        // Wire stdio for JSON-RPC
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let spawn_failed = |reason: String| McpError::SpawnFailed {
            command: config.display_command(),
            reason,
        };

        let mut child = cmd.spawn().map_err(|e| spawn_failed(format!("{e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_failed("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_failed("failed to capture stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_failed("failed to capture stderr".into()))?;

        tracing::info!(
            server = %name,
            command = %config.display_command(),
            pid = child.id(),
            "server process spawned"
        );

        let transport = StdioTransport::new(&name, stdin, stdout)
            .with_diagnostics(StderrCapture::spawn(&name, stderr));

        Ok((
            ManagedProcess {
                name,
                process: child,
                shutdown_timeout: SHUTDOWN_TIMEOUT,
                finished: false,
            },
            transport,
        ))
    }

    /// Change how long [`shutdown`](Self::shutdown) waits before force-killing.
    pub fn set_shutdown_timeout(&mut self, timeout: Duration) {
        self.shutdown_timeout = timeout;
    }

    pub fn id(&self) -> Option<u32> {
        self.process.id()
    }

    /// Check if the server process is still running.
    pub fn is_alive(&mut self) -> bool {
        match self.process.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(_) => false,
        }
    }

    /// Terminate the process: SIGTERM, bounded wait, then SIGKILL.
    ///
    /// The caller closes stdin first. Every step is best-effort; this never
    /// fails and is a no-op once the process has been reaped.
    pub async fn shutdown(&mut self) {
        if self.finished {
            return;
        }

        match self.process.try_wait() {
            Ok(Some(status)) => {
                tracing::info!(server = %self.name, code = ?status.code(), "server already exited");
                self.finished = true;
                return;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(server = %self.name, error = %e, "failed to poll server status");
            }
        }

        self.request_termination();

        match tokio::time::timeout(self.shutdown_timeout, self.process.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(server = %self.name, code = ?status.code(), "server exited");
                self.finished = true;
                return;
            }
            Ok(Err(e)) => {
                tracing::warn!(server = %self.name, error = %e, "wait failed after terminate");
            }
            Err(_) => {
                tracing::warn!(
                    server = %self.name,
                    timeout_secs = self.shutdown_timeout.as_secs_f64(),
                    "server did not exit in time, killing"
                );
            }
        }

        // Force kill if graceful shutdown failed/timed out
        if let Err(e) = self.process.kill().await {
            tracing::warn!(server = %self.name, error = %e, "kill failed");
        }
        self.finished = true;
    }

    #[cfg(unix)]
    fn request_termination(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.process.id() {
            tracing::debug!(server = %self.name, pid, "sending SIGTERM");
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::warn!(server = %self.name, pid, error = %e, "SIGTERM failed");
            }
        }
    }

    #[cfg(not(unix))]
    fn request_termination(&mut self) {
        if let Err(e) = self.process.start_kill() {
            tracing::warn!(server = %self.name, error = %e, "terminate failed");
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
