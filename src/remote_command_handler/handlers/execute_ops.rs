// src/remote_command_handler/handlers/execute_ops.rs
// ============================================
// Command execution handler
// ============================================

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::constants::{EXIT_CODE_SPAWN_FAILED, EXIT_CODE_TIMED_OUT};
use crate::config::defaults::DEFAULT_COMMAND_TIMEOUT_SECS;
use crate::protocol::AgentMessage;
use crate::types::AgentError;

/// Output drained from one pipe so far
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn push(&self, chunk: &[u8]) {
        if let Ok(mut buffer) = self.0.lock() {
            buffer.extend_from_slice(chunk);
        }
    }

    fn take(&self) -> String {
        let bytes = self.0.lock().map(|mut buffer| std::mem::take(&mut *buffer)).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Drain `pipe` into a shared buffer until EOF
fn spawn_capture<R>(pipe: Option<R>) -> (Captured, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let captured = Captured::default();
    let sink = captured.clone();

    let handle = tokio::spawn(async move {
        let Some(mut pipe) = pipe else { return };
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => sink.push(&chunk[..n]),
                Err(e) => {
                    debug!("Command pipe read failed: {}", e);
                    break;
                }
            }
        }
    });

    (captured, handle)
}

/// Run `command` through `shell -c` and capture its output.
///
/// Always produces a `CmdResult`. Non-positive timeouts fall back to the
/// default. On timeout the child is killed and the output captured up to
/// that point is returned.
pub async fn handle_execute(shell: &str, request_id: &str, command: &str, timeout_seconds: i32) -> AgentMessage {
    let timeout_secs = if timeout_seconds <= 0 {
        DEFAULT_COMMAND_TIMEOUT_SECS
    } else {
        timeout_seconds as u64
    };
    let timeout_duration = Duration::from_secs(timeout_secs);

    let mut process = Command::new(shell);
    process
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match process.spawn() {
        Ok(child) => child,
        Err(e) => {
            let error = AgentError::Execution(format!("failed to start {}: {}", shell, e));
            warn!(request_id, "{}", error);
            return cmd_result(request_id, EXIT_CODE_SPAWN_FAILED, String::new(), String::new(), Some(error.to_string()));
        }
    };

    let start = Instant::now();
    let (stdout, mut stdout_task) = spawn_capture(child.stdout.take());
    let (stderr, mut stderr_task) = spawn_capture(child.stderr.take());

    // The pipes count as part of the run: a background process still
    // holding them keeps the command alive until the deadline.
    let run = async {
        let status = child.wait().await?;
        let _ = (&mut stdout_task).await;
        let _ = (&mut stderr_task).await;
        Ok::<_, std::io::Error>(status)
    };
    let outcome = timeout(timeout_duration, run).await;

    match outcome {
        Ok(Ok(status)) => {
            let exit_code = exit_code(status);
            info!(
                request_id,
                exit_code,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Command finished"
            );
            cmd_result(request_id, exit_code, stdout.take(), stderr.take(), None)
        }
        Ok(Err(e)) => {
            let error = AgentError::Execution(format!("failed to wait for command: {}", e));
            warn!(request_id, "{}", error);
            cmd_result(request_id, EXIT_CODE_SPAWN_FAILED, stdout.take(), stderr.take(), Some(error.to_string()))
        }
        Err(_) => {
            warn!(request_id, "Command timed out after {}s", timeout_secs);
            if let Err(e) = child.kill().await {
                debug!(request_id, "Failed to kill timed out command: {}", e);
            }
            stdout_task.abort();
            stderr_task.abort();
            cmd_result(
                request_id,
                EXIT_CODE_TIMED_OUT,
                stdout.take(),
                stderr.take(),
                Some(format!("command timed out after {}s", timeout_secs)),
            )
        }
    }
}

/// Exit code of a finished process; `128 + signal` when killed by a signal
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    EXIT_CODE_SPAWN_FAILED
}

fn cmd_result(request_id: &str, exit_code: i32, stdout: String, stderr: String, error: Option<String>) -> AgentMessage {
    AgentMessage::CmdResult {
        request_id: request_id.to_string(),
        exit_code,
        stdout,
        stderr,
        error,
    }
}
