//! Backend capability detection.
//!
//! Probes which backends are installed and logged in, resolves the machine
//! name used in routed hostnames, and recommends a default method. Every
//! probe is bounded by `Config::probe_timeout`; nothing here mutates state.

mod overlay;
mod routed;


pub use overlay::{OverlayProbe, OverlayStatus, probe_overlay};
pub use routed::{RoutedStatus, probe_routed};

use crate::config::Config;
use crate::runtime::tunnel::TunnelMethod;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityReport {
    pub machine_name: String,
    pub overlay_status: OverlayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_hostname: Option<String>,
    pub routed_status: RoutedStatus,
    pub routed_domain: String,
    pub routed_tunnel_name: String,
    pub recommended_method: TunnelMethod,
}

/// Probe every backend and pick a default method.
pub async fn detect(config: &Config) -> CapabilityReport {
    let overlay = probe_overlay(&config.overlay.binary, config.probe_timeout()).await;
    let routed_status = probe_routed(
        &config.routed.binary,
        &config.routed.credentials_path(),
        config.probe_timeout(),
    )
    .await;
    let routed_domain = config.routed.domain().unwrap_or_default().to_string();
    let machine_name = machine_name_from(config.machine_name.as_deref(), &overlay);

    let report = CapabilityReport {
        routed_tunnel_name: tunnel_resource_name(config, &machine_name),
        recommended_method: recommend(overlay.status, routed_status, &routed_domain),
        overlay_status: overlay.status,
        overlay_hostname: overlay.dns_name,
        routed_status,
        routed_domain,
        machine_name,
    };
    tracing::debug!(?report, "capability detection complete");
    report
}

/// Fixed priority: routed (authenticated + domain) > overlay (ready) > quick.
pub fn recommend(overlay: OverlayStatus, routed: RoutedStatus, domain: &str) -> TunnelMethod {
    if routed == RoutedStatus::Authenticated && !domain.trim().is_empty() {
        TunnelMethod::RoutedNamed
    } else if overlay == OverlayStatus::Ready {
        TunnelMethod::OverlayFunnel
    } else {
        TunnelMethod::QuickEphemeral
    }
}

/// Machine name for routed hostnames: override → overlay host → OS hostname.
pub async fn resolve_machine_name(config: &Config) -> String {
    if let Some(name) = config.machine_name.as_deref().and_then(sanitize_label) {
        return name;
    }
    let overlay = probe_overlay(&config.overlay.binary, config.probe_timeout()).await;
    machine_name_from(None, &overlay)
}

fn machine_name_from(explicit: Option<&str>, overlay: &OverlayProbe) -> String {
    explicit
        .and_then(sanitize_label)
        .or_else(|| overlay.machine_label().and_then(|label| sanitize_label(&label)))
        .or_else(os_hostname)
        .unwrap_or_else(|| "localhost".to_string())
}

fn os_hostname() -> Option<String> {
    let raw = hostname::get().ok()?;
    let raw = raw.to_string_lossy();
    // Strip a local domain suffix such as `.local` or `.lan`.
    sanitize_label(raw.split('.').next().unwrap_or_default())
}

/// Name of the named-tunnel resource: explicit override or the machine name.
pub fn tunnel_resource_name(config: &Config, machine_name: &str) -> String {
    config
        .routed
        .tunnel_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map_or_else(|| machine_name.to_string(), str::to_string)
}

/// Lowercase DNS label: ASCII alphanumerics and single hyphens, no leading or
/// trailing hyphen, at most 63 bytes. `None` when nothing usable remains.
pub fn sanitize_label(raw: &str) -> Option<String> {
    let mut label = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            label.push(c);
        } else if !label.ends_with('-') && !label.is_empty() {
            label.push('-');
        }
    }
    label.truncate(63);
    let label = label.trim_end_matches('-').to_string();
    (!label.is_empty()).then_some(label)
}
