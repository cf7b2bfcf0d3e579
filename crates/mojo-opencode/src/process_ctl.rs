//! Process spawn/health/stop primitives shared by SSH key generation, git
//! operations, and the OpenCode/gateway binaries themselves. Grounded on
//! `skynet-gateway/src/mcp_lifecycle.rs::run_with_timeout` (poll-with-
//! timeout subprocess helper) and `skynet-terminal/src/manager.rs`'s
//! timeout-raced `tokio::process::Command` spawn with a `libc::kill`
//! escalation path.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use tokio::process::Command as AsyncCommand;

use crate::error::{OpenCodeError, Result};

/// Run `cmd`, killing it if it doesn't finish within `timeout`.
pub async fn run_with_timeout(cmd: &mut AsyncCommand, timeout: Duration, label: &str) -> Result<Output> {
    let child = cmd
        .spawn()
        .map_err(|e| OpenCodeError::SubprocessFailed { command: label.to_string(), reason: e.to_string() })?;
    let pid = child.id();

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(OpenCodeError::SubprocessFailed { command: label.to_string(), reason: e.to_string() }),
        Err(_elapsed) => {
            if let Some(raw_pid) = pid {
                #[cfg(unix)]
                unsafe {
                    libc::kill(raw_pid as libc::pid_t, libc::SIGKILL);
                }
            }
            Err(OpenCodeError::Timeout { operation: label.to_string(), timeout_secs: timeout.as_secs() })
        }
    }
}

/// `kill(pid, 0)`: succeeds without sending a signal, just checks that the
/// PID exists and is ours to signal.
pub fn pid_is_alive(pid: u32) -> bool {
    #[cfg(unix)]
    unsafe {
        libc::kill(pid as libc::pid_t, 0) == 0
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// SIGTERM, then poll for exit, then SIGKILL if it's still alive after
/// `graceful_timeout`.
pub async fn stop_pid(pid: u32, graceful_timeout: Duration) -> Result<()> {
    if !pid_is_alive(pid) {
        return Ok(());
    }

    #[cfg(unix)]
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }

    let deadline = tokio::time::Instant::now() + graceful_timeout;
    while tokio::time::Instant::now() < deadline {
        if !pid_is_alive(pid) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    if pid_is_alive(pid) {
        #[cfg(unix)]
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    Ok(())
}

/// Spawn a long-running server process detached from our own process tree
/// (no `Child` handle kept around to reap — the PID is persisted and
/// liveness is checked later via [`pid_is_alive`], the same continuity
/// model the state file relies on across manager restarts).
pub fn spawn_detached(
    bin: &str,
    args: &[String],
    envs: &[(String, String)],
    cwd: Option<&Path>,
) -> Result<u32> {
    let mut cmd = std::process::Command::new(bin);
    cmd.args(args);
    for (k, v) in envs {
        cmd.env(k, v);
    }
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());

    let child = cmd.spawn().map_err(|e| OpenCodeError::SubprocessFailed { command: bin.to_string(), reason: e.to_string() })?;
    Ok(child.id())
}

/// Whether a TCP port on localhost currently answers (a crude but
/// sufficient liveness probe for the OpenCode HTTP server / gateway).
pub async fn port_answers(port: u16, timeout: Duration) -> bool {
    let addr = format!("127.0.0.1:{port}");
    matches!(tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&addr)).await, Ok(Ok(_)))
}

/// Whether a TCP port is free to bind (used by the port pool allocator).
pub fn port_is_free(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_with_timeout_returns_output_for_a_fast_command() {
        let mut cmd = AsyncCommand::new("true");
        let output = run_with_timeout(&mut cmd, Duration::from_secs(5), "true").await.unwrap();
        assert!(output.status.success());
    }

    #[tokio::test]
    async fn run_with_timeout_errors_when_the_deadline_elapses() {
        let mut cmd = AsyncCommand::new("sleep");
        cmd.arg("5");
        let result = run_with_timeout(&mut cmd, Duration::from_millis(50), "sleep").await;
        assert!(matches!(result, Err(OpenCodeError::Timeout { .. })));
    }

    #[test]
    fn pid_zero_like_nonexistent_pid_is_not_alive() {
        assert!(!pid_is_alive(999_999));
    }

    #[test]
    fn port_is_free_reflects_an_actual_bound_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!port_is_free(port));
        drop(listener);
        assert!(port_is_free(port));
    }
}
