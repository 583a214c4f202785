use crate::runtime::tunnel::command::{CommandError, run_capture};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OverlayStatus {
    NotInstalled,
    NeedsLogin,
    NotConnected,
    Ready,
}

/// Overlay network state as reported by `tailscale status --json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayProbe {
    pub status: OverlayStatus,
    /// MagicDNS name without the trailing dot, e.g. `laptop.tail1234.ts.net`.
    pub dns_name: Option<String>,
    pub host_name: Option<String>,
}

impl OverlayProbe {
    fn with_status(status: OverlayStatus) -> Self {
        Self {
            status,
            dns_name: None,
            host_name: None,
        }
    }

    /// Overlay-assigned machine label: first DNS label, else the host name.
    pub fn machine_label(&self) -> Option<String> {
        self.dns_name
            .as_deref()
            .and_then(|dns| dns.split('.').next())
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .or_else(|| self.host_name.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusJson {
    #[serde(default)]
    backend_state: String,
    #[serde(rename = "Self", default)]
    self_node: Option<SelfNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SelfNode {
    #[serde(rename = "DNSName", default)]
    dns_name: String,
    #[serde(default)]
    host_name: String,
}

pub async fn probe_overlay(binary: &str, timeout: Duration) -> OverlayProbe {
    match run_capture(binary, &["status", "--json"], timeout).await {
        Ok(output) => parse_status(&output.stdout),
        Err(CommandError::NotFound) => OverlayProbe::with_status(OverlayStatus::NotInstalled),
        Err(error) => {
            tracing::debug!(?error, "overlay status probe failed");
            OverlayProbe::with_status(OverlayStatus::NotConnected)
        }
    }
}

/// Map `tailscale status --json` output onto an overlay probe. The status
/// command exits non-zero when logged out, so the exit code is ignored and
/// only the JSON is trusted.
pub(crate) fn parse_status(raw: &str) -> OverlayProbe {
    let Ok(status) = serde_json::from_str::<StatusJson>(raw) else {
        return OverlayProbe::with_status(OverlayStatus::NotConnected);
    };

    let state = match status.backend_state.as_str() {
        "Running" => OverlayStatus::Ready,
        "NeedsLogin" | "NoState" | "NeedsMachineAuth" => OverlayStatus::NeedsLogin,
        _ => OverlayStatus::NotConnected,
    };
    let node = status.self_node;
    let dns_name = node
        .as_ref()
        .map(|n| n.dns_name.trim_end_matches('.').to_string())
        .filter(|n| !n.is_empty());
    let host_name = node
        .map(|n| n.host_name)
        .filter(|n| !n.is_empty());

    OverlayProbe {
        status: state,
        dns_name,
        host_name,
    }
}
