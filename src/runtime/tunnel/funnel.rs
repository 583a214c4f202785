use super::command::{run_capture, run_checked};
use super::{LaunchFuture, LaunchOutcome, Launcher, TunnelMethod};
use crate::error::{Result, TunnelError};
use crate::runtime::detect::{OverlayStatus, probe_overlay};
use crate::runtime::state::{BackendHandle, TunnelRecord};
use std::time::Duration;

/// `tailscale funnel` talks to the local daemon only; a few seconds is plenty.
const FUNNEL_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Overlay funnel: wraps `tailscale funnel`.
///
/// There is no per-tunnel process: the tailscale daemon forwards the public
/// funnel port to the local port, and the funnel port is the ownership handle.
pub struct FunnelLauncher {
    binary: String,
    funnel_port: u16,
    probe_timeout: Duration,
}

impl FunnelLauncher {
    pub fn new(binary: String, funnel_port: u16, probe_timeout: Duration) -> Self {
        Self {
            binary,
            funnel_port,
            probe_timeout,
        }
    }

    async fn ready_hostname(&self) -> Result<String> {
        let backend = TunnelMethod::OverlayFunnel;
        let probe = probe_overlay(&self.binary, self.probe_timeout).await;
        match probe.status {
            OverlayStatus::NotInstalled => Err(TunnelError::NotInstalled {
                backend,
                binary: self.binary.clone(),
            }),
            OverlayStatus::NeedsLogin => Err(TunnelError::NotAuthenticated {
                backend,
                detail: format!("run `{} up` to log in", self.binary),
            }),
            OverlayStatus::NotConnected => Err(TunnelError::LaunchFailed {
                backend,
                detail: format!("overlay network is not connected; run `{} up`", self.binary),
            }),
            OverlayStatus::Ready => probe.dns_name.ok_or_else(|| TunnelError::LaunchFailed {
                backend,
                detail: "overlay node has no DNS name; enable MagicDNS and HTTPS certificates"
                    .into(),
            }),
        }
    }

    fn https_flag(&self) -> String {
        format!("--https={}", self.funnel_port)
    }
}

/// `https://host` on 443, `https://host:port` otherwise.
pub fn funnel_url(hostname: &str, funnel_port: u16) -> String {
    if funnel_port == 443 {
        format!("https://{hostname}")
    } else {
        format!("https://{hostname}:{funnel_port}")
    }
}

impl Launcher for FunnelLauncher {
    fn method(&self) -> TunnelMethod {
        TunnelMethod::OverlayFunnel
    }

    fn start<'a>(&'a self, local_port: u16, name: &'a str) -> LaunchFuture<'a, Result<LaunchOutcome>> {
        Box::pin(async move {
            let hostname = self.ready_hostname().await?;

            // tailscale funnel --bg --https=<funnel port> http://localhost:<port>
            let target = format!("http://localhost:{local_port}");
            let https = self.https_flag();
            run_checked(
                self.method(),
                &self.binary,
                &["funnel", "--bg", &https, &target],
                FUNNEL_COMMAND_TIMEOUT,
            )
            .await?;

            let public_url = funnel_url(&hostname, self.funnel_port);
            tracing::info!(name, %public_url, local_port, "overlay funnel enabled");
            Ok(LaunchOutcome {
                public_url,
                handle: BackendHandle::Funnel {
                    funnel_port: self.funnel_port,
                    hostname,
                },
                config_path: None,
                log_path: None,
            })
        })
    }

    fn stop<'a>(&'a self, record: &'a TunnelRecord) -> LaunchFuture<'a, Result<()>> {
        Box::pin(async move {
            let funnel_port = match &record.handle {
                BackendHandle::Funnel { funnel_port, .. } => *funnel_port,
                _ => self.funnel_port,
            };
            let https = format!("--https={funnel_port}");
            run_checked(
                self.method(),
                &self.binary,
                &["funnel", &https, "off"],
                FUNNEL_COMMAND_TIMEOUT,
            )
            .await?;
            tracing::info!(name = %record.name, funnel_port, "overlay funnel disabled");
            Ok(())
        })
    }

    fn stop_all(&self) -> LaunchFuture<'_, Result<()>> {
        Box::pin(async move {
            run_checked(
                self.method(),
                &self.binary,
                &["funnel", "reset"],
                FUNNEL_COMMAND_TIMEOUT,
            )
            .await?;
            Ok(())
        })
    }

    fn is_alive<'a>(&'a self, record: &'a TunnelRecord) -> LaunchFuture<'a, bool> {
        Box::pin(async move {
            let BackendHandle::Funnel {
                funnel_port,
                hostname,
            } = &record.handle
            else {
                return false;
            };
            let Ok(output) = run_capture(&self.binary, &["funnel", "status"], self.probe_timeout).await
            else {
                return false;
            };
            let needle = funnel_url(hostname, *funnel_port);
            output.success && output.stdout.contains(&needle)
        })
    }
}
