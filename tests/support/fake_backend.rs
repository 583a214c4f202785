#![allow(dead_code)]

use devtunnel::Config;
use std::path::Path;
use std::sync::LazyLock;

pub static SPAWN_LOCK: LazyLock<tokio::sync::Mutex<()>> =
    LazyLock::new(|| tokio::sync::Mutex::new(()));

/// Config rooted in `root` whose backends are all absent.
pub fn isolated_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.state_dir = root.join("state").display().to_string();
    config.machine_name = Some("ci-box".into());
    config.overlay.binary = "devtunnel-absent-tailscale".into();
    config.routed.binary = "devtunnel-absent-cloudflared".into();
    config.routed.credentials_dir = root.join("creds").display().to_string();
    config.quick.binary = "devtunnel-absent-cloudflared".into();
    config.quick.poll_interval_ms = 50;
    config.quick.poll_attempts = 40;
    config.lock.timeout_ms = 1_000;
    config
}

/// A cloudflared stand-in that prints a quick-tunnel URL and keeps running
/// until terminated.
#[cfg(unix)]
pub fn install_quick_cloudflared(dir: &Path, name: &str, label: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        "#!/bin/sh\n\
         case \"$1\" in --version) echo 'cloudflared version 2024.1.0'; exit 0 ;; esac\n\
         echo 'INF Registered tunnel connection' >&2\n\
         echo 'INF |  https://{label}.trycloudflare.com  |' >&2\n\
         trap 'kill $! 2>/dev/null; exit 0' TERM\n\
         sleep 20 &\n\
         wait\n"
    );
    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}
