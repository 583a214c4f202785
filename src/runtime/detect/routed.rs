use crate::runtime::tunnel::command::{CommandError, run_capture};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Origin certificate written by `cloudflared tunnel login`.
pub const ORIGIN_CERT: &str = "cert.pem";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RoutedStatus {
    NotInstalled,
    NotAuthenticated,
    Authenticated,
}

pub async fn probe_routed(binary: &str, credentials_dir: &Path, timeout: Duration) -> RoutedStatus {
    match run_capture(binary, &["--version"], timeout).await {
        Err(CommandError::NotFound) => return RoutedStatus::NotInstalled,
        Err(error) => tracing::debug!(?error, "routed version probe failed"),
        Ok(_) => {}
    }
    if credentials_dir.join(ORIGIN_CERT).is_file() {
        RoutedStatus::Authenticated
    } else {
        RoutedStatus::NotAuthenticated
    }
}
