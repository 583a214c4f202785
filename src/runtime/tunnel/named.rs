use super::command::{launch_error, run_capture, run_checked};
use super::ingress::IngressConfig;
use super::process::{
    find_processes, is_named_tunnel, serves_named_tunnel, spawn_logged, tail_lines,
    terminate_and_wait,
};
use super::{LaunchFuture, LaunchOutcome, Launcher, TunnelMethod};
use crate::config::Config;
use crate::error::{Result, TunnelError};
use crate::runtime::detect::{
    RoutedStatus, probe_routed, resolve_machine_name, sanitize_label, tunnel_resource_name,
};
use crate::runtime::state::{BackendHandle, NameLock, TunnelRecord};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for `tunnel list/create/route` round trips to the provider API.
const API_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TunnelEntry {
    id: String,
    name: String,
}

/// Public hostname of a routed tunnel: `{name}-{machine}.{domain}`.
pub fn routed_hostname(name: &str, machine_name: &str, domain: &str) -> String {
    let label = sanitize_label(&format!("{name}-{machine_name}"))
        .unwrap_or_else(|| machine_name.to_string());
    format!("{label}.{}", domain.trim().trim_matches('.'))
}

/// Routed/named tunnel: one persistent cloudflared tunnel per machine.
///
/// Every tunnel name becomes an ingress rule in the machine's shared config
/// file, and a single `cloudflared tunnel run` process serves all of them.
/// Starting a name rewrites the file and restarts that process.
pub struct NamedLauncher {
    config: Config,
    config_dir: PathBuf,
    log_dir: PathBuf,
}

impl NamedLauncher {
    pub fn new(config: Config) -> Self {
        let state = config.state_path();
        Self {
            config_dir: state.join("cloudflared"),
            log_dir: state.join("logs"),
            config,
        }
    }

    fn binary(&self) -> &str {
        &self.config.routed.binary
    }

    /// Serialize every change to the shared ingress file and process of
    /// `tunnel`. Different tunnel names on one machine all end up here.
    async fn lock_tunnel(&self, tunnel: &str) -> Result<NameLock> {
        let routed = &self.config.routed;
        let timeout = Duration::from_millis(
            self.config.lock.timeout_ms + routed.settle_ms + routed.restart_grace_ms,
        );
        let key = format!("routed.{}", sanitize_label(tunnel).unwrap_or_default());
        NameLock::acquire(&self.config.state_path(), &key, timeout).await
    }

    /// Path of the ingress file for `tunnel`.
    pub fn ingress_path(&self, tunnel: &str) -> PathBuf {
        self.config_dir.join(format!("{tunnel}.yml"))
    }

    async fn require_login(&self) -> Result<()> {
        let backend = self.method();
        let credentials_dir = self.config.routed.credentials_path();
        match probe_routed(self.binary(), &credentials_dir, self.config.probe_timeout()).await {
            RoutedStatus::Authenticated => Ok(()),
            RoutedStatus::NotInstalled => Err(TunnelError::NotInstalled {
                backend,
                binary: self.binary().to_string(),
            }),
            RoutedStatus::NotAuthenticated => Err(TunnelError::NotAuthenticated {
                backend,
                detail: format!(
                    "no origin certificate in {}; run `{} tunnel login`",
                    credentials_dir.display(),
                    self.binary()
                ),
            }),
        }
    }

    async fn find_tunnel_id(&self, tunnel: &str) -> Result<Option<String>> {
        let output = run_checked(
            self.method(),
            self.binary(),
            &["tunnel", "list", "--output", "json"],
            API_COMMAND_TIMEOUT,
        )
        .await?;
        let raw = output.stdout.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let entries: Option<Vec<TunnelEntry>> = serde_json::from_str(raw)?;
        Ok(entries
            .unwrap_or_default()
            .into_iter()
            .find(|entry| entry.name == tunnel)
            .map(|entry| entry.id))
    }

    /// Id of the named tunnel, creating it on first use.
    async fn ensure_tunnel(&self, tunnel: &str) -> Result<String> {
        if let Some(id) = self.find_tunnel_id(tunnel).await? {
            return Ok(id);
        }
        tracing::info!(tunnel, "creating named tunnel");
        run_checked(
            self.method(),
            self.binary(),
            &["tunnel", "create", tunnel],
            API_COMMAND_TIMEOUT,
        )
        .await?;
        self.find_tunnel_id(tunnel)
            .await?
            .ok_or_else(|| TunnelError::LaunchFailed {
                backend: self.method(),
                detail: format!("tunnel {tunnel:?} was created but does not show up in `tunnel list`"),
            })
    }

    async fn route_dns(&self, tunnel: &str, hostname: &str) -> Result<()> {
        let args = ["tunnel", "route", "dns", tunnel, hostname];
        let output = run_capture(self.binary(), &args, API_COMMAND_TIMEOUT)
            .await
            .map_err(|e| launch_error(self.method(), self.binary(), &args, e))?;
        if output.success {
            tracing::info!(tunnel, hostname, "DNS route created");
        } else if output.mentions("already exists") {
            tracing::debug!(tunnel, hostname, "DNS route already exists");
        } else {
            return Err(TunnelError::LaunchFailed {
                backend: self.method(),
                detail: format!("could not route {hostname}: {}", output.message()),
            });
        }
        Ok(())
    }

    /// Kill every process serving `tunnel` and give the edge a moment to
    /// release its connections.
    async fn stop_running(&self, tunnel: &str) {
        let pids = find_processes(|cmd| serves_named_tunnel(cmd, self.binary(), tunnel));
        if pids.is_empty() {
            return;
        }
        for pid in &pids {
            if !terminate_and_wait(*pid).await {
                tracing::warn!(tunnel, pid, "named tunnel process did not exit");
            }
        }
        tracing::info!(tunnel, pids = ?pids, "stopped running named tunnel");
        tokio::time::sleep(Duration::from_millis(self.config.routed.restart_grace_ms)).await;
    }

    async fn spawn_and_settle(&self, tunnel: &str, ingress_path: &Path, log_path: &Path) -> Result<u32> {
        let backend = self.method();
        // cloudflared tunnel --no-autoupdate --config <file> run <tunnel>
        let args = vec![
            "tunnel".to_string(),
            "--no-autoupdate".to_string(),
            "--config".to_string(),
            ingress_path.display().to_string(),
            "run".to_string(),
            tunnel.to_string(),
        ];
        let mut child = spawn_logged(self.binary(), &args, log_path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                TunnelError::NotInstalled {
                    backend,
                    binary: self.binary().to_string(),
                }
            } else {
                TunnelError::Io(e)
            }
        })?;
        let pid = child.id().ok_or_else(|| TunnelError::LaunchFailed {
            backend,
            detail: "process exited before its pid could be recorded".into(),
        })?;

        tokio::time::sleep(Duration::from_millis(self.config.routed.settle_ms)).await;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(TunnelError::LaunchFailed {
                backend,
                detail: format!(
                    "tunnel process exited ({status}); last log lines:\n{}",
                    tail_lines(log_path, 20)
                ),
            });
        }
        Ok(pid)
    }

    fn remove_rule(&self, tunnel: &str, hostname: &str) -> Result<bool> {
        let path = self.ingress_path(tunnel);
        let Some(mut ingress) = IngressConfig::load(&path)? else {
            return Ok(false);
        };
        if !ingress.remove(hostname) {
            return Ok(false);
        }
        ingress.save(&path)?;
        Ok(true)
    }
}

impl Launcher for NamedLauncher {
    fn method(&self) -> TunnelMethod {
        TunnelMethod::RoutedNamed
    }

    fn start<'a>(&'a self, local_port: u16, name: &'a str) -> LaunchFuture<'a, Result<LaunchOutcome>> {
        Box::pin(async move {
            let backend = self.method();
            let Some(domain) = self.config.routed.domain() else {
                return Err(TunnelError::NotAuthenticated {
                    backend,
                    detail: "no domain configured; set routed.domain or DEVTUNNEL_DOMAIN".into(),
                });
            };
            self.require_login().await?;

            let machine_name = resolve_machine_name(&self.config).await;
            let tunnel = tunnel_resource_name(&self.config, &machine_name);
            let hostname = routed_hostname(name, &machine_name, domain);
            let label = format!("{name}-{machine_name}");
            if !hostname.starts_with(&format!("{label}.")) {
                // Sanitizing would map this name onto a hostname another name can claim.
                return Err(TunnelError::InvalidName {
                    name: name.to_string(),
                    reason: format!("`{label}` is not a valid DNS label of at most 63 characters"),
                });
            }

            let tunnel_id = self.ensure_tunnel(&tunnel).await?;
            let credentials_file = self
                .config
                .routed
                .credentials_path()
                .join(format!("{tunnel_id}.json"));
            if !credentials_file.exists() {
                return Err(TunnelError::CredentialsMissing {
                    path: credentials_file,
                });
            }

            self.route_dns(&tunnel, &hostname).await?;

            let _shared = self.lock_tunnel(&tunnel).await?;
            let ingress_path = self.ingress_path(&tunnel);
            let mut ingress = IngressConfig::load(&ingress_path)?
                .unwrap_or_else(|| IngressConfig::new(&tunnel, &credentials_file));
            ingress.tunnel.clone_from(&tunnel);
            ingress.credentials_file.clone_from(&credentials_file);
            ingress.upsert(&hostname, local_port);
            ingress.save(&ingress_path)?;
            tracing::debug!(path = %ingress_path.display(), hosts = ?ingress.hostnames().collect::<Vec<_>>(), "ingress updated");

            self.stop_running(&tunnel).await;

            let log_path = self.log_dir.join(format!("routed-{tunnel}.log"));
            let pid = match self.spawn_and_settle(&tunnel, &ingress_path, &log_path).await {
                Ok(pid) => pid,
                Err(err) => {
                    if let Err(error) = self.remove_rule(&tunnel, &hostname) {
                        tracing::warn!(%hostname, %error, "failed to roll back ingress rule");
                    }
                    return Err(err);
                }
            };

            let public_url = format!("https://{hostname}");
            tracing::info!(name, %public_url, pid, %tunnel, local_port, "named tunnel running");
            Ok(LaunchOutcome {
                public_url,
                handle: BackendHandle::Routed {
                    pid,
                    tunnel_name: tunnel,
                    hostname,
                },
                config_path: Some(ingress_path),
                log_path: Some(log_path),
            })
        })
    }

    fn stop<'a>(&'a self, record: &'a TunnelRecord) -> LaunchFuture<'a, Result<()>> {
        Box::pin(async move {
            let BackendHandle::Routed {
                tunnel_name,
                hostname,
                ..
            } = &record.handle
            else {
                return Ok(());
            };
            let _shared = self.lock_tunnel(tunnel_name).await?;
            if self.remove_rule(tunnel_name, hostname)? {
                tracing::info!(name = %record.name, %hostname, "ingress rule removed");
            } else {
                tracing::debug!(name = %record.name, %hostname, "no ingress rule to remove");
            }
            Ok(())
        })
    }

    fn stop_all(&self) -> LaunchFuture<'_, Result<()>> {
        Box::pin(async move {
            let pids = find_processes(|cmd| is_named_tunnel(cmd, self.binary()));
            for pid in &pids {
                if !terminate_and_wait(*pid).await {
                    tracing::warn!(pid, "named tunnel process did not exit");
                }
            }
            tracing::info!(count = pids.len(), "named tunnel processes terminated");

            // Nothing serves the rules any more; the next start rebuilds them.
            let entries = match std::fs::read_dir(&self.config_dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            for path in entries.filter_map(|entry| entry.ok().map(|e| e.path())) {
                if path.extension().is_some_and(|ext| ext == "yml") {
                    std::fs::remove_file(&path)?;
                    tracing::debug!(path = %path.display(), "ingress file removed");
                }
            }
            Ok(())
        })
    }

    fn is_alive<'a>(&'a self, record: &'a TunnelRecord) -> LaunchFuture<'a, bool> {
        Box::pin(async move {
            let BackendHandle::Routed {
                tunnel_name,
                hostname,
                ..
            } = &record.handle
            else {
                return false;
            };
            let serving = !find_processes(|cmd| serves_named_tunnel(cmd, self.binary(), tunnel_name))
                .is_empty();
            let routed = IngressConfig::load(&self.ingress_path(tunnel_name))
                .ok()
                .flatten()
                .is_some_and(|ingress| ingress.hostnames().any(|h| h == hostname));
            serving && routed
        })
    }
}
