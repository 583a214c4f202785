//! Fake backend binaries for launcher and orchestrator tests.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Held while writing and spawning fake binaries, so no concurrently forked
/// child still has a script open for writing when it is executed.
pub(crate) static SPAWN_LOCK: LazyLock<tokio::sync::Mutex<()>> =
    LazyLock::new(|| tokio::sync::Mutex::new(()));

/// Runs in the background until terminated, taking its sleeper with it.
pub(crate) const SERVE_FOREVER: &str = "trap 'kill $! 2>/dev/null; exit 0' TERM\nsleep 20 &\nwait\n";

/// Write an executable shell script `dir/name` and return its path.
#[cfg(unix)]
pub(crate) fn fake_binary(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

/// cloudflared stand-in that prints a quick-tunnel banner and stays up.
#[cfg(unix)]
pub(crate) fn fake_quick_cloudflared(dir: &Path, name: &str, label: &str) -> String {
    let body = format!(
        "case \"$1\" in --version) echo 'cloudflared version 2024.1.0'; exit 0 ;; esac\n\
         echo 'INF Requesting new quick Tunnel on trycloudflare.com...' >&2\n\
         echo 'INF |  https://{label}.trycloudflare.com  |' >&2\n\
         {SERVE_FOREVER}"
    );
    fake_binary(dir, name, &body)
}

/// cloudflared stand-in for named tunnels: one existing tunnel `tunnel`
/// with id `tunnel_id`, DNS routes that already exist, and a `run`
/// subcommand that stays up.
#[cfg(unix)]
pub(crate) fn fake_named_cloudflared(dir: &Path, name: &str, tunnel: &str, tunnel_id: &str) -> String {
    let body = format!(
        "case \"$*\" in\n\
         --version) echo 'cloudflared version 2024.1.0' ;;\n\
         'tunnel list'*) echo '[{{\"id\":\"{tunnel_id}\",\"name\":\"{tunnel}\",\"connections\":[]}}]' ;;\n\
         'tunnel create'*) echo 'created' ;;\n\
         'tunnel route dns'*) echo 'record with that host already exists' >&2; exit 1 ;;\n\
         *' run '*)\n{SERVE_FOREVER};;\n\
         *) echo \"unexpected: $*\" >&2; exit 2 ;;\n\
         esac\n"
    );
    fake_binary(dir, name, &body)
}

/// tailscale stand-in: a running node named `dns_name` whose funnel state
/// lives in a file next to the script. Every invocation is appended to
/// [`FakeTailscale::calls`].
#[cfg(unix)]
pub(crate) struct FakeTailscale {
    pub(crate) binary: String,
    argv_log: PathBuf,
}

#[cfg(unix)]
impl FakeTailscale {
    pub(crate) fn install(dir: &Path, name: &str, dns_name: &str) -> Self {
        let argv_log = dir.join(format!("{name}.argv"));
        let funnel_state = dir.join(format!("{name}.funnel"));
        let host = dns_name.split('.').next().unwrap_or(dns_name);
        let (argv, state) = (argv_log.display(), funnel_state.display());
        let body = format!(
            "echo \"$*\" >> '{argv}'\n\
             case \"$*\" in\n\
             'status --json') echo '{{\"BackendState\":\"Running\",\"Self\":{{\"DNSName\":\"{dns_name}.\",\"HostName\":\"{host}\"}}}}' ;;\n\
             'funnel status') cat '{state}' 2>/dev/null ;;\n\
             'funnel --bg '*) echo \"https://{dns_name}:${{3#--https=}} (Funnel on)\" > '{state}' ;;\n\
             funnel*' off'|'funnel reset') rm -f '{state}' ;;\n\
             *) echo \"unexpected: $*\" >&2; exit 2 ;;\n\
             esac\n"
        );
        let binary = fake_binary(dir, name, &body);
        Self { binary, argv_log }
    }

    /// Arguments of every invocation so far, one string per call.
    pub(crate) fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(&self.argv_log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Calls other than status probes.
    pub(crate) fn funnel_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with("funnel") && call != "funnel status")
            .collect()
    }
}

/// Credentials directory holding an origin certificate and the credentials
/// file for `tunnel_id`.
pub(crate) fn logged_in_credentials(dir: &Path, tunnel_id: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("cert.pem"), "cert").unwrap();
    std::fs::write(dir.join(format!("{tunnel_id}.json")), "{}").unwrap();
}
