//! Cancellable subprocess spawning with captured stdout/stderr/exit.
//!
//! On cancel, a SIGTERM is sent first, followed by SIGKILL after a grace
//! period, matching the external I/O plumbing contract in §4.9.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::core::CoreError;

const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// A running subprocess: line streams for stdout/stderr and a handle used to
/// await completion or cancel.
pub struct SpawnHandle {
    pub stdout: mpsc::UnboundedReceiver<String>,
    pub stderr: mpsc::UnboundedReceiver<String>,
    child: Child,
}

impl SpawnHandle {
    /// Wait for the process to exit.
    pub async fn wait(mut self) -> Result<ExitStatus, CoreError> {
        self.child.wait().await.map_err(|e| CoreError::Other { message: e.to_string() })
    }

    /// Send SIGTERM; if the process hasn't exited within the grace period,
    /// send SIGKILL.
    pub async fn cancel(mut self) {
        terminate(&self.child);
        let grace = tokio::time::sleep(KILL_GRACE_PERIOD);
        tokio::select! {
            _ = self.child.wait() => {}
            () = grace => {
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: `pid` is the PID of our own child process, obtained from
        // `Child::id`, and `SIGTERM` requests graceful shutdown.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {
    // No graceful-termination signal on this platform; `cancel` falls
    // through to SIGKILL-equivalent after the grace period.
}

/// Spawn `program` with `args` in `cwd` (or the current directory), returning
/// a handle with live stdout/stderr line streams.
pub fn spawn(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<SpawnHandle, CoreError> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| CoreError::SubprocessError {
        argv: argv(program, args),
        exit_status: None,
        stderr_tail: e.to_string(),
    })?;

    let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
    let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump_lines(stdout, stdout_tx));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump_lines(stderr, stderr_tx));
    }

    Ok(SpawnHandle { stdout: stdout_rx, stderr: stderr_rx, child })
}

async fn pump_lines(reader: impl tokio::io::AsyncRead + Unpin, tx: mpsc::UnboundedSender<String>) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).is_err() {
            break;
        }
    }
}

fn argv(program: &str, args: &[&str]) -> Vec<String> {
    std::iter::once(program.to_string()).chain(args.iter().map(|s| s.to_string())).collect()
}

/// Convenience wrapper for a spawn-then-wait-for-success call, collecting the
/// stderr tail for error reporting.
pub async fn spawn_and_wait(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
) -> Result<(), CoreError> {
    let mut handle = spawn(program, args, cwd)?;
    let mut stderr_lines = Vec::new();
    while let Some(line) = handle.stderr.recv().await {
        stderr_lines.push(line);
    }
    let status = handle.wait().await?;
    if status.success() {
        Ok(())
    } else {
        Err(CoreError::SubprocessError {
            argv: argv(program, args),
            exit_status: status.code(),
            stderr_tail: stderr_lines.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_and_wait_succeeds_for_true() {
        spawn_and_wait("true", &[], None).await.unwrap();
    }

    #[tokio::test]
    async fn spawn_and_wait_reports_failure() {
        let result = spawn_and_wait("false", &[], None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn spawn_captures_stdout_lines() {
        let mut handle = spawn("echo", &["hello"], None).unwrap();
        let line = handle.stdout.recv().await;
        assert_eq!(line.as_deref(), Some("hello"));
        handle.wait().await.unwrap();
    }
}
