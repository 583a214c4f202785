use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Funnel ports the overlay network accepts for public exposure.
pub const FUNNEL_PORTS: [u16; 3] = [443, 8443, 10000];

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Overrides the machine name used in routed hostnames
    #[serde(default)]
    pub machine_name: Option<String>,
    /// Root for records, locks, logs and generated ingress files (default: ~/.devtunnel)
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    /// Upper bound for each capability probe command
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default)]
    pub overlay: OverlayConfig,

    #[serde(default)]
    pub routed: RoutedConfig,

    #[serde(default)]
    pub quick: QuickConfig,

    #[serde(default)]
    pub lock: LockConfig,
}

fn default_state_dir() -> String {
    "~/.devtunnel".into()
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            machine_name: None,
            state_dir: default_state_dir(),
            probe_timeout_ms: default_probe_timeout_ms(),
            overlay: OverlayConfig::default(),
            routed: RoutedConfig::default(),
            quick: QuickConfig::default(),
            lock: LockConfig::default(),
        }
    }
}

impl Config {
    pub fn state_path(&self) -> PathBuf {
        expand_path(&self.state_dir)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !FUNNEL_PORTS.contains(&self.overlay.funnel_port) {
            anyhow::bail!(
                "overlay.funnel_port = {} is not a funnel port (allowed: 443, 8443, 10000)",
                self.overlay.funnel_port
            );
        }
        if self.quick.poll_attempts == 0 || self.quick.poll_interval_ms == 0 {
            anyhow::bail!("quick.poll_attempts and quick.poll_interval_ms must be greater than 0");
        }
        for (key, binary) in [
            ("overlay.binary", &self.overlay.binary),
            ("routed.binary", &self.routed.binary),
            ("quick.binary", &self.quick.binary),
        ] {
            if binary.trim().is_empty() {
                anyhow::bail!("{key} must not be empty");
            }
        }
        if let Some(domain) = &self.routed.domain
            && (domain.starts_with('.') || domain.contains(char::is_whitespace))
        {
            anyhow::bail!("routed.domain {domain:?} is not a valid DNS domain");
        }
        Ok(())
    }
}

/// Expand a leading `~` in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

// ── Overlay funnel (tailscale) ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_overlay_binary")]
    pub binary: String,
    /// Public funnel port (default: 443)
    #[serde(default = "default_funnel_port")]
    pub funnel_port: u16,
}

fn default_overlay_binary() -> String {
    "tailscale".into()
}

fn default_funnel_port() -> u16 {
    443
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            binary: default_overlay_binary(),
            funnel_port: default_funnel_port(),
        }
    }
}

// ── Routed / named tunnel (cloudflared) ───────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedConfig {
    #[serde(default = "default_cloudflared_binary")]
    pub binary: String,
    /// DNS zone routed hostnames are created under. Unset disables routed tunnels.
    #[serde(default)]
    pub domain: Option<String>,
    /// Named tunnel resource; defaults to the machine name
    #[serde(default)]
    pub tunnel_name: Option<String>,
    /// Holds `cert.pem` and the per-tunnel credential files
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: String,
    /// How long a freshly spawned tunnel must survive before it counts as started
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Pause between killing a running tunnel and restarting it
    #[serde(default = "default_restart_grace_ms")]
    pub restart_grace_ms: u64,
}

fn default_cloudflared_binary() -> String {
    "cloudflared".into()
}

fn default_credentials_dir() -> String {
    "~/.cloudflared".into()
}

fn default_settle_ms() -> u64 {
    3_000
}

fn default_restart_grace_ms() -> u64 {
    1_000
}

impl Default for RoutedConfig {
    fn default() -> Self {
        Self {
            binary: default_cloudflared_binary(),
            domain: None,
            tunnel_name: None,
            credentials_dir: default_credentials_dir(),
            settle_ms: default_settle_ms(),
            restart_grace_ms: default_restart_grace_ms(),
        }
    }
}

impl RoutedConfig {
    /// Configured domain, with blank values treated as unset.
    pub fn domain(&self) -> Option<&str> {
        self.domain
            .as_deref()
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
    }

    pub fn credentials_path(&self) -> PathBuf {
        expand_path(&self.credentials_dir)
    }
}

// ── Quick / ephemeral tunnel (cloudflared) ────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickConfig {
    #[serde(default = "default_cloudflared_binary")]
    pub binary: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_poll_attempts() -> u32 {
    30
}

impl Default for QuickConfig {
    fn default() -> Self {
        Self {
            binary: default_cloudflared_binary(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_attempts: default_poll_attempts(),
        }
    }
}

// ── Per-name lock ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long `start`/`stop` wait for another invocation on the same name
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    10_000
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_lock_timeout_ms(),
        }
    }
}
