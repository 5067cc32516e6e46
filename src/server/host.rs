use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::timeout;

use crate::core::protocol::{FeedbackRequest, FeedbackResult};
use crate::utils::process::terminate_tree;

/// How long a finished host may take to exit before it is torn down.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(10);
/// Grace between the polite signal and the hard kill when a host is torn
/// down.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);
const REAP_WAIT: Duration = Duration::from_secs(5);

/// How session host processes get started.
///
/// The default launcher re-invokes the current executable with the
/// `session` subcommand, so every request gets a fresh process with its
/// own runtime. Tests substitute an arbitrary program that speaks the
/// same one-line protocol on stdout.
#[derive(Debug, Clone)]
pub struct HostLauncher {
    program: PathBuf,
    leading_args: Vec<String>,
    settings_file: Option<PathBuf>,
}

impl HostLauncher {
    pub fn from_current_exe() -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| anyhow!("Failed to get current executable path: {}", e))?;
        Ok(Self {
            program,
            leading_args: vec!["session".to_string()],
            settings_file: None,
        })
    }

    pub fn custom(program: impl Into<PathBuf>, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
            settings_file: None,
        }
    }

    /// Point spawned hosts at an explicit project settings file instead of
    /// the default one.
    pub fn with_settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_file = Some(path.into());
        self
    }

    /// Spawn one host for the given request. The host inherits stdin and
    /// stderr so its dialog reaches the terminal the server runs in; its
    /// stdout is reserved for the result line.
    pub fn spawn(&self, request: &FeedbackRequest) -> Result<SessionHost> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args);
        cmd.arg("--dir").arg(&request.project_directory);
        cmd.arg("--prompt").arg(&request.prompt);
        if let Some(path) = &self.settings_file {
            cmd.arg("--settings-file").arg(path);
        }

        // Pass through RUST_LOG environment variable
        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            cmd.env("RUST_LOG", rust_log);
        }

        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn session host process: {}", e))?;

        let pid = child
            .id()
            .ok_or_else(|| anyhow!("session host has no pid"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("session host has no stdout pipe"))?;

        tracing::info!("Spawned session host with PID: {}", pid);

        Ok(SessionHost {
            child,
            pid,
            stdout: BufReader::new(stdout).lines(),
        })
    }
}

/// A running session host, seen from the server side.
#[derive(Debug)]
pub struct SessionHost {
    child: Child,
    pid: u32,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl SessionHost {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Wait for the host's single result line. A host that closes stdout
    /// without sending one counts as a cancelled session.
    pub async fn read_result(&mut self) -> Result<FeedbackResult> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .context("failed to read from session host")?;
            match line {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    return serde_json::from_str(line).with_context(|| {
                        format!("session host {} produced an unreadable result", self.pid)
                    });
                }
                None => {
                    tracing::warn!(
                        "Session host {} closed without sending a result, treating as cancelled",
                        self.pid
                    );
                    return Ok(FeedbackResult::default());
                }
            }
        }
    }

    /// Collect a host that has delivered its result. Escalates to a
    /// teardown if it does not exit on its own.
    pub async fn shutdown(mut self) {
        match timeout(SHUTDOWN_WAIT, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("Session host {} finished: {}", self.pid, status);
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to wait for session host {}: {}", self.pid, e);
            }
            Err(_) => {
                tracing::warn!(
                    "Session host {} did not exit after its result, terminating",
                    self.pid
                );
                self.terminate().await;
            }
        }
    }

    /// Tear the host down, descendants first, and reap it.
    pub async fn terminate(mut self) {
        terminate_tree(self.pid, TERMINATE_GRACE).await;

        match timeout(REAP_WAIT, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("Session host {} terminated: {}", self.pid, status);
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to reap session host {}: {}", self.pid, e);
            }
            Err(_) => {
                tracing::warn!("Session host {} survived termination, killing", self.pid);
                let _ = self.child.start_kill();
                let _ = timeout(REAP_WAIT, self.child.wait()).await;
            }
        }
    }
}

/// A host dropped without `shutdown` or `terminate` is still running,
/// as when the requesting client disconnects mid-request and the
/// handler future is cancelled. Its tree must not outlive the request.
impl Drop for SessionHost {
    fn drop(&mut self) {
        // id() is None once the child has been reaped, so hosts that went
        // through shutdown() or terminate() are left alone.
        if self.child.id().is_none() {
            return;
        }
        let pid = self.pid;
        tracing::warn!("Session host {} dropped before being collected, terminating", pid);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                terminate_tree(pid, TERMINATE_GRACE).await;
            });
        }
    }
}
