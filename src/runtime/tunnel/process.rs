use crate::runtime::wait::{WaitOutcome, WaitPolicy, wait_for};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System, UpdateKind};
use tokio::process::{Child, Command};

/// How long a terminated tunnel process gets to exit before we move on.
const EXIT_WAIT: WaitPolicy = WaitPolicy::new(Duration::from_millis(100), 50);

/// Spawn a long-running backend daemon with stdout and stderr going to
/// `log_path` (truncated first, so stale output never satisfies a poll).
///
/// The child is placed in its own process group and is not killed when the
/// handle drops: it must outlive this invocation.
pub(crate) fn spawn_logged(program: &str, args: &[String], log_path: &Path) -> std::io::Result<Child> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)?;
    let log_err = log.try_clone()?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .kill_on_drop(false);
    #[cfg(unix)]
    command.process_group(0);

    let child = command.spawn()?;
    tracing::debug!(program, ?args, pid = child.id(), log = %log_path.display(), "spawned backend process");
    Ok(child)
}

/// Whether `pid` names a running (non-zombie) process.
pub fn process_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    sys.process(pid)
        .is_some_and(|p| p.status() != ProcessStatus::Zombie)
}

/// Command line of a running process, if it is still alive.
pub(crate) fn process_cmdline(pid: u32) -> Option<Vec<String>> {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );
    sys.process(pid)
        .filter(|p| p.status() != ProcessStatus::Zombie)
        .map(|p| p.cmd().iter().map(|a| a.to_string_lossy().into_owned()).collect())
}

/// Pids of every live process whose command line satisfies `matches`.
pub(crate) fn find_processes(matches: impl Fn(&[String]) -> bool) -> Vec<u32> {
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );
    let own_pid = std::process::id();
    let mut pids: Vec<u32> = sys
        .processes()
        .iter()
        .filter(|(_, p)| p.status() != ProcessStatus::Zombie)
        .filter(|(pid, _)| pid.as_u32() != own_pid)
        .filter(|(_, p)| {
            let cmd: Vec<String> = p.cmd().iter().map(|a| a.to_string_lossy().into_owned()).collect();
            matches(&cmd)
        })
        .map(|(pid, _)| pid.as_u32())
        .collect();
    pids.sort_unstable();
    pids
}

/// Send SIGTERM (or the platform's closest equivalent). Returns whether a
/// signal was delivered.
pub(crate) fn terminate(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    let Some(process) = sys.process(pid) else {
        return false;
    };
    process
        .kill_with(Signal::Term)
        .unwrap_or_else(|| process.kill())
}

/// Terminate `pid` and wait (bounded) until it is gone.
pub(crate) async fn terminate_and_wait(pid: u32) -> bool {
    if !terminate(pid) {
        return !process_alive(pid);
    }
    let outcome = wait_for(EXIT_WAIT, || async move { (!process_alive(pid)).then_some(()) }).await;
    if outcome == WaitOutcome::TimedOut {
        tracing::warn!(pid, "process ignored SIGTERM, escalating to SIGKILL");
        let mut sys = System::new();
        let target = Pid::from_u32(pid);
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            ProcessRefreshKind::nothing(),
        );
        if let Some(process) = sys.process(target) {
            process.kill();
        }
        return wait_for(EXIT_WAIT, || async move { (!process_alive(pid)).then_some(()) })
            .await
            .ready()
            .is_some();
    }
    true
}

/// Last `lines` lines of a log file, empty when it cannot be read.
pub fn tail_lines(path: &Path, lines: usize) -> String {
    let Ok(bytes) = fs::read(path) else {
        return String::new();
    };
    let text = String::from_utf8_lossy(&bytes);
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

// ── Command-line matchers ─────────────────────────────────────────

/// argv[0] (or the script argument of an interpreter) is `binary`.
pub(crate) fn matches_binary(cmd: &[String], binary: &str) -> bool {
    let Some(wanted) = Path::new(binary).file_name() else {
        return false;
    };
    cmd.iter()
        .take(2)
        .any(|arg| Path::new(arg).file_name() == Some(wanted))
}

fn has_arg(cmd: &[String], arg: &str) -> bool {
    cmd.iter().any(|a| a == arg)
}

/// `cloudflared tunnel … run <tunnel>`
pub(crate) fn serves_named_tunnel(cmd: &[String], binary: &str, tunnel: &str) -> bool {
    matches_binary(cmd, binary)
        && has_arg(cmd, "tunnel")
        && cmd.windows(2).any(|w| w[0] == "run" && w[1] == tunnel)
}

/// `cloudflared tunnel … run …` on any tunnel.
pub(crate) fn is_named_tunnel(cmd: &[String], binary: &str) -> bool {
    matches_binary(cmd, binary) && has_arg(cmd, "tunnel") && has_arg(cmd, "run")
}

/// `cloudflared tunnel … --url …`
pub(crate) fn is_quick_tunnel(cmd: &[String], binary: &str) -> bool {
    matches_binary(cmd, binary) && has_arg(cmd, "tunnel") && has_arg(cmd, "--url")
}
