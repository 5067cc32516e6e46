use std::collections::HashMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;

use crate::utils::process::terminate_tree;

/// Grace given to the process tree between the polite signal and the hard
/// kill when a run is stopped.
const STOP_GRACE: Duration = Duration::from_secs(3);
/// How long to wait for the shell to be reapable after its tree was killed.
const REAP_WAIT: Duration = Duration::from_secs(1);

const EXIT_CODE_SIGNAL_BASE: i32 = 128;

/// One attached shell command: the child process plus the two tasks that
/// stream its output back to the owning session, line by line.
///
/// A runner only exists once the process is spawned; a failed spawn leaves
/// the session without one. Lines from a single stream arrive in emission
/// order, stdout and stderr are not ordered against each other.
#[derive(Debug)]
pub struct CommandRunner {
    child: Child,
    pid: u32,
    exit_code: Option<i32>,
}

impl CommandRunner {
    /// Start `command_line` through the platform shell in
    /// `working_directory` with exactly the given environment. Each output
    /// line is forwarded on `line_tx` as it is read.
    pub fn spawn(
        command_line: &str,
        working_directory: &Path,
        environment: &HashMap<String, String>,
        line_tx: UnboundedSender<String>,
    ) -> Result<Self> {
        if command_line.trim().is_empty() {
            return Err(anyhow!("command line is empty"));
        }

        let mut command = shell_command(command_line);
        command
            .current_dir(working_directory)
            .env_clear()
            .envs(environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to start '{}'", command_line))?;

        let pid = child
            .id()
            .ok_or_else(|| anyhow!("spawned process has no pid"))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("child process has no stdout pipe"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("child process has no stderr pipe"))?;

        tokio::spawn(forward_lines(stdout, line_tx.clone()));
        tokio::spawn(forward_lines(stderr, line_tx));

        tracing::debug!("started '{}' as pid {}", command_line, pid);

        Ok(Self {
            child,
            pid,
            exit_code: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        self.exit_code.is_none()
    }

    /// Non-blocking exit check. Returns the exit code once the process is
    /// gone, whether it finished on its own or was stopped. Meant to be
    /// called on the session's poll tick.
    pub fn poll_exit(&mut self) -> Option<i32> {
        if self.exit_code.is_some() {
            return self.exit_code;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                let code = exit_code_of(status);
                self.exit_code = Some(code);
                Some(code)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("could not poll process {}: {}", self.pid, e);
                None
            }
        }
    }

    /// Terminate the process and all of its descendants, then reap the
    /// shell. No-op once the process has exited.
    pub async fn stop(&mut self) {
        if self.exit_code.is_some() {
            return;
        }

        terminate_tree(self.pid, STOP_GRACE).await;

        match tokio::time::timeout(REAP_WAIT, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exit_code = Some(exit_code_of(status));
            }
            Ok(Err(e)) => {
                tracing::warn!("failed to reap process {}: {}", self.pid, e);
            }
            Err(_) => {
                tracing::warn!("process {} is still not reapable after kill", self.pid);
            }
        }
    }
}

fn shell_command(command_line: &str) -> Command {
    #[cfg(unix)]
    {
        let mut command = Command::new("/bin/sh");
        command.arg("-c").arg(command_line);
        command
    }
    #[cfg(windows)]
    {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(command_line);
        command
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        EXIT_CODE_SIGNAL_BASE + status.signal().unwrap_or(0)
    }
    #[cfg(not(unix))]
    {
        -1
    }
}

async fn forward_lines<R>(stream: R, line_tx: UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line_tx.send(line).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = line_tx.send(format!("Error reading output: {}", e));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn exit_code_uses_the_real_code_when_present() {
        use std::os::unix::process::ExitStatusExt;
        // Raw wait status for "exited with code 2".
        let status = ExitStatus::from_raw(0x0200);
        assert_eq!(exit_code_of(status), 2);
    }

    #[cfg(unix)]
    #[test]
    fn signal_death_maps_above_128() {
        use std::os::unix::process::ExitStatusExt;
        // Raw wait status for "killed by SIGKILL".
        let status = ExitStatus::from_raw(9);
        assert_eq!(exit_code_of(status), 137);
    }

    #[test]
    fn empty_command_line_is_rejected() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let err = CommandRunner::spawn("   ", Path::new("."), &HashMap::new(), tx)
            .expect_err("blank command must not spawn");
        assert!(err.to_string().contains("empty"));
    }
}
