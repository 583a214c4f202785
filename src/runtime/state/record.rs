use crate::runtime::tunnel::TunnelMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ownership handle a launcher needs to tear its tunnel down again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendHandle {
    /// A spawned daemon owned by exactly this tunnel.
    Process { pid: u32 },
    /// The overlay has no per-tunnel process; the funnel port identifies it.
    Funnel { funnel_port: u16, hostname: String },
    /// A shared named-tunnel process that may serve several hostnames.
    Routed {
        pid: u32,
        tunnel_name: String,
        hostname: String,
    },
}

impl BackendHandle {
    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Process { pid } | Self::Routed { pid, .. } => Some(*pid),
            Self::Funnel { .. } => None,
        }
    }
}

/// Persisted description of one active tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelRecord {
    pub name: String,
    pub method: TunnelMethod,
    pub local_port: u16,
    pub public_url: String,
    pub handle: BackendHandle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl TunnelRecord {
    pub fn local_endpoint(&self) -> String {
        format!("localhost:{}", self.local_port)
    }
}
