use crate::error::TunnelError;
use crate::runtime::tunnel::TunnelMethod;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Captured result of a short-lived backend command.
#[derive(Debug, Clone)]
pub(crate) struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Stderr when present, stdout otherwise.
    pub fn message(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }

    pub fn mentions(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }
}

#[derive(Debug)]
pub(crate) enum CommandError {
    NotFound,
    TimedOut(Duration),
    Io(std::io::Error),
}

/// Run `program args…` to completion, killing it if it outlives `timeout`.
pub(crate) async fn run_capture(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                CommandError::NotFound
            } else {
                CommandError::Io(e)
            }
        })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| CommandError::TimedOut(timeout))?
        .map_err(CommandError::Io)?;

    let output = CommandOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    tracing::debug!(program, ?args, success = output.success, "backend command finished");
    Ok(output)
}

/// Like `run_capture`, but any failure becomes a `TunnelError` for `backend`.
pub(crate) async fn run_checked(
    backend: TunnelMethod,
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<CommandOutput, TunnelError> {
    let output = run_capture(program, args, timeout)
        .await
        .map_err(|e| launch_error(backend, program, args, e))?;
    if !output.success {
        return Err(TunnelError::LaunchFailed {
            backend,
            detail: format!("`{program} {}` failed: {}", args.join(" "), output.message()),
        });
    }
    Ok(output)
}

pub(crate) fn launch_error(
    backend: TunnelMethod,
    program: &str,
    args: &[&str],
    err: CommandError,
) -> TunnelError {
    match err {
        CommandError::NotFound => TunnelError::NotInstalled {
            backend,
            binary: program.to_string(),
        },
        CommandError::TimedOut(after) => TunnelError::LaunchFailed {
            backend,
            detail: format!(
                "`{program} {}` did not finish within {}s",
                args.join(" "),
                after.as_secs()
            ),
        },
        CommandError::Io(e) => TunnelError::Io(e),
    }
}
