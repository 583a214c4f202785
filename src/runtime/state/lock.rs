use crate::error::{Result, TunnelError};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const LOCK_RETRY_POLL: Duration = Duration::from_millis(100);

/// Cross-invocation mutex for a single tunnel name.
///
/// `start` and `stop` for the same name run a kill-then-restart sequence that
/// is not reentrant, so both hold this lock for their whole duration. The
/// lock is an advisory `flock` on `<state>/locks/<key>.lock`: the kernel
/// drops it when the holder exits, so a crashed invocation never leaves a
/// lock behind. The file itself stays on disk and only carries the holder's
/// pid for diagnostics.
#[derive(Debug)]
pub struct NameLock {
    path: PathBuf,
    file: File,
}

impl NameLock {
    pub async fn acquire(state_dir: &Path, key: &str, timeout: Duration) -> Result<Self> {
        let lock_dir = state_dir.join("locks");
        fs::create_dir_all(&lock_dir)?;
        let path = lock_dir.join(format!("{key}.lock"));
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;
        let deadline = Instant::now() + timeout;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    file.set_len(0)?;
                    writeln!(file, "pid={}", std::process::id())?;
                    return Ok(Self { path, file });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    let holder = read_holder_pid(&path);
                    if Instant::now() >= deadline {
                        return Err(TunnelError::LockTimeout {
                            name: key.to_string(),
                            holder,
                        });
                    }
                    tracing::debug!(key, ?holder, "waiting for tunnel lock");
                    tokio::time::sleep(LOCK_RETRY_POLL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for NameLock {
    fn drop(&mut self) {
        // Clear the pid while still holding the lock; the next holder rewrites it.
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
    }
}

fn read_holder_pid(path: &Path) -> Option<u32> {
    let contents = fs::read_to_string(path).ok()?;
    contents
        .lines()
        .find_map(|line| line.strip_prefix("pid="))
        .and_then(|pid| pid.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn acquire_writes_pid_and_drop_releases() {
        let tmp = TempDir::new().unwrap();
        let lock = NameLock::acquire(tmp.path(), "web", Duration::from_secs(1))
            .await
            .unwrap();
        let path = lock.path().to_path_buf();
        assert_eq!(read_holder_pid(&path), Some(std::process::id()));

        drop(lock);
        assert_eq!(read_holder_pid(&path), None);
        let _again = NameLock::acquire(tmp.path(), "web", Duration::from_millis(100))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn second_acquire_times_out_while_held() {
        let tmp = TempDir::new().unwrap();
        let _held = NameLock::acquire(tmp.path(), "web", Duration::from_secs(1))
            .await
            .unwrap();

        let err = NameLock::acquire(tmp.path(), "web", Duration::from_millis(250))
            .await
            .unwrap_err();
        match err {
            TunnelError::LockTimeout { name, holder } => {
                assert_eq!(name, "web");
                assert_eq!(holder, Some(std::process::id()));
            }
            other => panic!("expected LockTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn different_names_do_not_contend() {
        let tmp = TempDir::new().unwrap();
        let _a = NameLock::acquire(tmp.path(), "a", Duration::from_millis(100))
            .await
            .unwrap();
        let _b = NameLock::acquire(tmp.path(), "b", Duration::from_millis(100))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn waiter_gets_lock_once_holder_drops() {
        let tmp = TempDir::new().unwrap();
        let held = NameLock::acquire(tmp.path(), "web", Duration::from_secs(1))
            .await
            .unwrap();

        let state_dir = tmp.path().to_path_buf();
        let waiter = tokio::spawn(async move {
            NameLock::acquire(&state_dir, "web", Duration::from_secs(5)).await
        });
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let lock = waiter.await.unwrap().unwrap();
        assert_eq!(read_holder_pid(lock.path()), Some(std::process::id()));
    }

    #[tokio::test]
    async fn leftover_file_from_dead_process_is_reused_exclusively() {
        let tmp = TempDir::new().unwrap();
        let lock_dir = tmp.path().join("locks");
        fs::create_dir_all(&lock_dir).unwrap();
        // pid_max on Linux tops out at 2^22, so this pid cannot be running.
        fs::write(lock_dir.join("web.lock"), "pid=4999999\n").unwrap();

        let first = NameLock::acquire(tmp.path(), "web", Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(read_holder_pid(first.path()), Some(std::process::id()));

        // A second invocation that also found the leftover file must not
        // take the lock over from the first.
        let err = NameLock::acquire(tmp.path(), "web", Duration::from_millis(250))
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::LockTimeout { .. }));
        assert!(first.path().exists());
    }
}
