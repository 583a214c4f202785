use crate::error::Result;
use crate::runtime::state::{BackendHandle, TunnelRecord};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

/// Boxed future returned by launcher operations.
pub type LaunchFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The three interchangeable ways of exposing a local port.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum TunnelMethod {
    /// Public funnel on the overlay network (tailscale).
    #[strum(to_string = "overlay_funnel", serialize = "tailscale", serialize = "funnel")]
    OverlayFunnel,
    /// Named tunnel with a stable DNS hostname (cloudflared).
    #[strum(to_string = "routed_named", serialize = "cloudflare", serialize = "named")]
    RoutedNamed,
    /// Account-less tunnel on a random provider hostname (cloudflared).
    #[strum(to_string = "quick_ephemeral", serialize = "quick")]
    QuickEphemeral,
}

/// What a launcher hands back after a successful start.
///
/// The orchestrator turns this into a `TunnelRecord`; it is the only place
/// backend-specific fields cross the launcher boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub public_url: String,
    pub handle: BackendHandle,
    pub config_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
}

/// Shared contract of the tunnel backends.
///
/// Implementations wrap an external binary (tailscale, cloudflared) invoked
/// as an opaque subprocess. `start` must either return a reachable public URL
/// or leave nothing running behind.
pub trait Launcher: Send + Sync {
    fn method(&self) -> TunnelMethod;

    /// Expose `localhost:local_port` under the tunnel `name`.
    fn start<'a>(&'a self, local_port: u16, name: &'a str) -> LaunchFuture<'a, Result<LaunchOutcome>>;

    /// Tear down the backend state behind one committed record.
    fn stop<'a>(&'a self, record: &'a TunnelRecord) -> LaunchFuture<'a, Result<()>>;

    /// Tear down everything this backend may have started, on any name.
    fn stop_all(&self) -> LaunchFuture<'_, Result<()>>;

    /// Best-effort liveness probe for `list --verify`.
    fn is_alive<'a>(&'a self, record: &'a TunnelRecord) -> LaunchFuture<'a, bool>;
}
