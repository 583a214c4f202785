//! Free-port discovery for local dev servers.
//!
//! Allocation is advisory: a port reported free can be taken by another
//! process before the caller binds it.

use crate::error::{Result, TunnelError};
use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Number of ports scanned from the base port.
pub const PORT_SCAN_SPAN: u16 = 100;

/// TCP `LISTEN` in the kernel socket tables.
const TCP_LISTEN: &str = "0A";

/// A way of asking whether a local TCP port is taken.
pub trait PortProbe {
    fn name(&self) -> &str;
    fn in_use(&self, port: u16) -> bool;
}

/// Kernel socket table (`/proc/net/tcp{,6}`), or a loopback bind where that
/// is unavailable.
pub struct SocketTableProbe {
    listening: Option<HashSet<u16>>,
}

impl SocketTableProbe {
    /// Snapshot the listening sockets once; later lookups do not re-read.
    pub fn snapshot() -> Self {
        Self {
            listening: read_proc_listeners(),
        }
    }
}

impl PortProbe for SocketTableProbe {
    fn name(&self) -> &str {
        "socket-table"
    }

    fn in_use(&self, port: u16) -> bool {
        match &self.listening {
            Some(ports) => ports.contains(&port),
            None => bind_fails(port),
        }
    }
}

/// `lsof -nP -iTCP:<port> -sTCP:LISTEN -t`; no `lsof` means free.
pub struct OpenPortsProbe {
    binary: String,
}

impl OpenPortsProbe {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for OpenPortsProbe {
    fn default() -> Self {
        Self::new("lsof")
    }
}

impl PortProbe for OpenPortsProbe {
    fn name(&self) -> &str {
        "open-ports"
    }

    fn in_use(&self, port: u16) -> bool {
        let filter = format!("-iTCP:{port}");
        let output = Command::new(&self.binary)
            .args(["-nP", &filter, "-sTCP:LISTEN", "-t"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();
        match output {
            Ok(output) => !String::from_utf8_lossy(&output.stdout).trim().is_empty(),
            Err(e) => {
                tracing::debug!(binary = %self.binary, error = %e, "open-ports probe unavailable");
                false
            }
        }
    }
}

/// First port in `[base, base + 100)` that neither default probe reports busy.
pub fn find_available_port(base: u16) -> Result<u16> {
    let sockets = SocketTableProbe::snapshot();
    let open_ports = OpenPortsProbe::default();
    find_available_port_with(base, &[&sockets, &open_ports])
}

/// Like [`find_available_port`] with an explicit probe set.
pub fn find_available_port_with(base: u16, probes: &[&dyn PortProbe]) -> Result<u16> {
    if base == 0 {
        return Err(TunnelError::InvalidConfig("base port must be between 1 and 65535".into()));
    }
    let end = base.saturating_add(PORT_SCAN_SPAN - 1);
    for port in base..=end {
        let busy = probes.iter().find(|probe| probe.in_use(port));
        match busy {
            Some(probe) => tracing::debug!(port, probe = probe.name(), "port in use"),
            None => return Ok(port),
        }
    }
    Err(TunnelError::NoPortAvailable { base })
}

/// Whether anything accepts TCP connections on `127.0.0.1:port` or
/// `[::1]:port`. Dev servers resolving `localhost` often bind only one.
pub async fn local_port_listening(port: u16) -> bool {
    for addr in [
        SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
        SocketAddr::from((Ipv6Addr::LOCALHOST, port)),
    ] {
        let connect = tokio::net::TcpStream::connect(addr);
        if let Ok(Ok(_)) = tokio::time::timeout(Duration::from_millis(500), connect).await {
            return true;
        }
    }
    false
}

fn bind_fails(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_err()
}

#[cfg(target_os = "linux")]
fn read_proc_listeners() -> Option<HashSet<u16>> {
    let mut ports = HashSet::new();
    let mut any_table = false;
    for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
        if let Ok(raw) = std::fs::read_to_string(table) {
            any_table = true;
            ports.extend(parse_listeners(&raw));
        }
    }
    any_table.then_some(ports)
}

#[cfg(not(target_os = "linux"))]
fn read_proc_listeners() -> Option<HashSet<u16>> {
    None
}

/// Local ports of `LISTEN` rows in a `/proc/net/tcp`-format table.
fn parse_listeners(raw: &str) -> impl Iterator<Item = u16> + '_ {
    raw.lines().skip(1).filter_map(|line| {
        let mut fields = line.split_whitespace();
        let local = fields.nth(1)?;
        let state = fields.nth(1)?;
        if state != TCP_LISTEN {
            return None;
        }
        let (_, port) = local.rsplit_once(':')?;
        u16::from_str_radix(port, 16).ok()
    })
}
