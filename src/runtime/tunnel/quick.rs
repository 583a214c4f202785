use super::process::{
    find_processes, is_quick_tunnel, process_cmdline, spawn_logged, tail_lines,
    terminate_and_wait,
};
use super::{LaunchFuture, LaunchOutcome, Launcher, TunnelMethod};
use crate::error::{Result, TunnelError};
use crate::runtime::state::{BackendHandle, TunnelRecord};
use crate::runtime::wait::{WaitOutcome, WaitPolicy, wait_for};
use regex::Regex;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::LazyLock;

static QUICK_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"https://([a-z0-9-]+)\.trycloudflare\.com").ok());

/// First quick-tunnel URL in `log`. `api.trycloudflare.com` is the
/// provisioning endpoint and shows up in error lines, so it never counts.
pub fn find_quick_url(log: &str) -> Option<String> {
    QUICK_URL
        .as_ref()?
        .captures_iter(log)
        .find(|caps| &caps[1] != "api")
        .map(|caps| caps[0].to_string())
}

enum Readiness {
    Url(String),
    Exited(String),
}

/// Quick tunnel: wraps `cloudflared tunnel --url`.
///
/// No account needed. cloudflared prints its random hostname to the log while
/// starting, so readiness is a bounded poll over the log file; on timeout the
/// spawned process is killed so nothing is left behind.
pub struct QuickLauncher {
    binary: String,
    policy: WaitPolicy,
    log_dir: PathBuf,
}

impl QuickLauncher {
    pub fn new(binary: String, policy: WaitPolicy, log_dir: PathBuf) -> Self {
        Self {
            binary,
            policy,
            log_dir,
        }
    }

    fn owns(&self, pid: u32) -> bool {
        process_cmdline(pid).is_some_and(|cmd| is_quick_tunnel(&cmd, &self.binary))
    }
}

impl Launcher for QuickLauncher {
    fn method(&self) -> TunnelMethod {
        TunnelMethod::QuickEphemeral
    }

    fn start<'a>(&'a self, local_port: u16, name: &'a str) -> LaunchFuture<'a, Result<LaunchOutcome>> {
        Box::pin(async move {
            let backend = self.method();
            let log_path = self.log_dir.join(format!("{name}.log"));
            // cloudflared tunnel --no-autoupdate --url http://localhost:<port>
            let args = vec![
                "tunnel".to_string(),
                "--no-autoupdate".to_string(),
                "--url".to_string(),
                format!("http://localhost:{local_port}"),
            ];

            let mut child = spawn_logged(&self.binary, &args, &log_path).map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    TunnelError::NotInstalled {
                        backend,
                        binary: self.binary.clone(),
                    }
                } else {
                    TunnelError::Io(e)
                }
            })?;
            let pid = child.id().ok_or_else(|| TunnelError::LaunchFailed {
                backend,
                detail: "process exited before its pid could be recorded".into(),
            })?;

            let outcome = wait_for(self.policy, || {
                let readiness = match child.try_wait() {
                    Ok(Some(status)) => Some(Readiness::Exited(status.to_string())),
                    _ => std::fs::read_to_string(&log_path)
                        .ok()
                        .and_then(|log| find_quick_url(&log))
                        .map(Readiness::Url),
                };
                std::future::ready(readiness)
            })
            .await;

            match outcome {
                WaitOutcome::Ready(Readiness::Url(public_url)) => {
                    tracing::info!(name, %public_url, pid, local_port, "quick tunnel ready");
                    Ok(LaunchOutcome {
                        public_url,
                        handle: BackendHandle::Process { pid },
                        config_path: None,
                        log_path: Some(log_path),
                    })
                }
                WaitOutcome::Ready(Readiness::Exited(status)) => Err(TunnelError::LaunchFailed {
                    backend,
                    detail: format!(
                        "process exited ({status}) before reporting a URL; last log lines:\n{}",
                        tail_lines(&log_path, 20)
                    ),
                }),
                WaitOutcome::TimedOut => {
                    if let Err(error) = child.kill().await {
                        tracing::warn!(pid, %error, "failed to kill quick tunnel after timeout");
                    }
                    Err(TunnelError::LaunchTimeout {
                        backend,
                        waited_secs: self.policy.budget().as_secs(),
                    })
                }
            }
        })
    }

    fn stop<'a>(&'a self, record: &'a TunnelRecord) -> LaunchFuture<'a, Result<()>> {
        Box::pin(async move {
            let Some(pid) = record.handle.pid() else {
                return Ok(());
            };
            if !self.owns(pid) {
                tracing::warn!(name = %record.name, pid, "quick tunnel process already gone");
                return Ok(());
            }
            if !terminate_and_wait(pid).await {
                return Err(TunnelError::LaunchFailed {
                    backend: self.method(),
                    detail: format!("process {pid} did not exit"),
                });
            }
            tracing::info!(name = %record.name, pid, "quick tunnel stopped");
            Ok(())
        })
    }

    fn stop_all(&self) -> LaunchFuture<'_, Result<()>> {
        Box::pin(async move {
            let pids = find_processes(|cmd| is_quick_tunnel(cmd, &self.binary));
            for pid in &pids {
                if !terminate_and_wait(*pid).await {
                    tracing::warn!(pid, "quick tunnel process did not exit");
                }
            }
            tracing::info!(count = pids.len(), "quick tunnel processes terminated");
            Ok(())
        })
    }

    fn is_alive<'a>(&'a self, record: &'a TunnelRecord) -> LaunchFuture<'a, bool> {
        Box::pin(async move { record.handle.pid().is_some_and(|pid| self.owns(pid)) })
    }
}
