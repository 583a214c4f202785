use crate::runtime::tunnel::TunnelMethod;
use std::path::PathBuf;
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error taxonomy for tunnel lifecycle operations.
///
/// Every variant that comes out of a launcher names the backend that was
/// attempted, so the CLI can tell the user what failed and which method to
/// try next. Configuration loading and the CLI layer keep using
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum TunnelError {
    // ── Backend availability ────────────────────────────────────────────
    #[error("{backend} is not installed (binary `{binary}` not found)")]
    NotInstalled { backend: TunnelMethod, binary: String },

    #[error("{backend} is not authenticated: {detail}")]
    NotAuthenticated {
        backend: TunnelMethod,
        detail: String,
    },

    #[error("tunnel credentials file missing: {}", .path.display())]
    CredentialsMissing { path: PathBuf },

    // ── Port allocation ─────────────────────────────────────────────────
    #[error("no free port in range {base}..{}", range_end(.base))]
    NoPortAvailable { base: u16 },

    // ── Launch ──────────────────────────────────────────────────────────
    #[error("{backend} did not report a public URL within {waited_secs}s")]
    LaunchTimeout {
        backend: TunnelMethod,
        waited_secs: u64,
    },

    #[error("{backend} failed to start: {detail}")]
    LaunchFailed {
        backend: TunnelMethod,
        detail: String,
    },

    // ── Input / coordination ────────────────────────────────────────────
    #[error("invalid tunnel name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("timed out waiting for lock on tunnel {name:?} held by pid {holder:?}")]
    LockTimeout { name: String, holder: Option<u32> },

    // ── Storage ─────────────────────────────────────────────────────────
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serialization(String),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn range_end(base: &u16) -> u32 {
    u32::from(*base) + u32::from(crate::runtime::ports::PORT_SCAN_SPAN)
}

impl TunnelError {
    /// The backend this error was raised for, if any.
    pub fn backend(&self) -> Option<TunnelMethod> {
        match self {
            Self::NotInstalled { backend, .. }
            | Self::NotAuthenticated { backend, .. }
            | Self::LaunchTimeout { backend, .. }
            | Self::LaunchFailed { backend, .. } => Some(*backend),
            Self::CredentialsMissing { .. } => Some(TunnelMethod::RoutedNamed),
            _ => None,
        }
    }

    /// Next method worth trying after this failure.
    ///
    /// Quick tunnels need no account, so they are the fallback for the other
    /// two backends. A failing quick tunnel has nothing left to fall back to.
    pub fn fallback(&self) -> Option<TunnelMethod> {
        match self.backend()? {
            TunnelMethod::RoutedNamed | TunnelMethod::OverlayFunnel => {
                Some(TunnelMethod::QuickEphemeral)
            }
            TunnelMethod::QuickEphemeral => None,
        }
    }
}

impl From<serde_json::Error> for TunnelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for TunnelError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, TunnelError>;
