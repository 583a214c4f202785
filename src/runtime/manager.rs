//! Tunnel orchestration: start, stop, stop-all and list on top of the
//! record store, the per-name lock and the backend launchers.

use crate::config::Config;
use crate::error::{Result, TunnelError};
use crate::runtime::detect::{CapabilityReport, detect};
use crate::runtime::ports::{find_available_port, local_port_listening};
use crate::runtime::state::{NameLock, TunnelRecord, TunnelStore, validate_name};
use crate::runtime::tunnel::process::tail_lines;
use crate::runtime::tunnel::{TunnelMethod, all_launchers, create_launcher};
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;

/// Result of `stop` for one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped(TunnelRecord),
    /// No record existed; nothing was touched.
    NotFound,
}

/// Name used when `start` is called without one.
pub fn default_name(local_port: u16) -> String {
    format!("port-{local_port}")
}

pub struct TunnelManager {
    config: Config,
    state_dir: PathBuf,
    store: TunnelStore,
}

impl TunnelManager {
    pub fn new(config: Config) -> Result<Self> {
        let state_dir = config.state_path();
        let store = TunnelStore::open(&state_dir)?;
        Ok(Self {
            config,
            state_dir,
            store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &TunnelStore {
        &self.store
    }

    fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.config.lock.timeout_ms)
    }

    pub async fn detect(&self) -> CapabilityReport {
        detect(&self.config).await
    }

    /// Expose `local_port` publicly under `name` (default `port-<port>`).
    ///
    /// Without an explicit method the detector's recommendation is used. An
    /// existing tunnel with the same name is torn down first. The record is
    /// written only after the backend reported a public URL.
    pub async fn start(
        &self,
        local_port: u16,
        name: Option<&str>,
        method: Option<TunnelMethod>,
    ) -> Result<TunnelRecord> {
        if local_port == 0 {
            return Err(TunnelError::InvalidConfig(
                "local port must be between 1 and 65535".into(),
            ));
        }
        let name = name.map_or_else(|| default_name(local_port), str::to_string);
        validate_name(&name)?;
        let _lock = NameLock::acquire(&self.state_dir, &name, self.lock_timeout()).await?;

        let method = match method {
            Some(method) => method,
            None => {
                let report = detect(&self.config).await;
                tracing::info!(method = %report.recommended_method, "using detected tunnel method");
                report.recommended_method
            }
        };

        if !local_port_listening(local_port).await {
            tracing::warn!(local_port, "nothing is listening on localhost:{local_port} yet");
        }

        if let Some(previous) = self.store.get(&name)? {
            tracing::info!(name, method = %previous.method, "replacing existing tunnel");
            self.teardown(&previous).await;
            self.store.delete(&name)?;
        }

        let launcher = create_launcher(method, &self.config);
        let outcome = launcher.start(local_port, &name).await?;
        let record = TunnelRecord {
            name,
            method,
            local_port,
            public_url: outcome.public_url,
            handle: outcome.handle,
            config_path: outcome.config_path,
            log_path: outcome.log_path,
            created_at: Utc::now(),
        };

        if let Err(err) = self.store.put(&record) {
            tracing::warn!(name = %record.name, error = %err, "could not persist tunnel record, tearing down");
            if let Err(error) = launcher.stop(&record).await {
                tracing::warn!(name = %record.name, %error, "teardown after failed persist also failed");
            }
            return Err(err);
        }
        tracing::info!(name = %record.name, method = %record.method, url = %record.public_url, "tunnel started");
        Ok(record)
    }

    async fn teardown(&self, record: &TunnelRecord) {
        let launcher = create_launcher(record.method, &self.config);
        if let Err(error) = launcher.stop(record).await {
            tracing::warn!(name = %record.name, method = %record.method, %error, "tunnel teardown failed");
        }
    }

    /// Tear down `name` and drop its record. A missing record is not an error.
    pub async fn stop(&self, name: &str) -> Result<StopOutcome> {
        validate_name(name)?;
        let _lock = NameLock::acquire(&self.state_dir, name, self.lock_timeout()).await?;

        let Some(record) = self.store.get(name)? else {
            tracing::warn!(name, "no tunnel with that name");
            return Ok(StopOutcome::NotFound);
        };
        self.teardown(&record).await;
        self.store.delete(name)?;
        tracing::info!(name, method = %record.method, "tunnel stopped");
        Ok(StopOutcome::Stopped(record))
    }

    /// Tear down every backend and clear every record. Failures are logged
    /// and skipped; returns the number of records cleared.
    pub async fn stop_all(&self) -> usize {
        for launcher in all_launchers(&self.config) {
            if let Err(error) = launcher.stop_all().await {
                tracing::warn!(method = %launcher.method(), %error, "stop-all teardown failed");
            }
        }
        match self.store.clear() {
            Ok(cleared) => {
                tracing::info!(cleared, "all tunnels stopped");
                cleared
            }
            Err(error) => {
                tracing::warn!(%error, "could not clear tunnel records");
                0
            }
        }
    }

    /// Records sorted by name, as stored. No backend is contacted.
    pub fn list(&self) -> Result<Vec<TunnelRecord>> {
        self.store.list()
    }

    /// Records paired with a liveness probe of their backend. Read-only.
    pub async fn list_verified(&self) -> Result<Vec<(TunnelRecord, bool)>> {
        let mut verified = Vec::new();
        for record in self.store.list()? {
            let alive = create_launcher(record.method, &self.config)
                .is_alive(&record)
                .await;
            verified.push((record, alive));
        }
        Ok(verified)
    }

    pub fn find_port(&self, base: u16) -> Result<u16> {
        find_available_port(base)
    }

    /// Where the background log of `name` lives, if it has one.
    pub fn log_path(&self, name: &str) -> Result<Option<PathBuf>> {
        validate_name(name)?;
        let recorded = self.store.get(name)?.and_then(|record| record.log_path);
        let path = recorded.unwrap_or_else(|| self.state_dir.join("logs").join(format!("{name}.log")));
        Ok(path.exists().then_some(path))
    }

    /// Last `lines` lines of the background log of `name`.
    pub fn log_tail(&self, name: &str, lines: usize) -> Result<Option<String>> {
        Ok(self.log_path(name)?.map(|path| tail_lines(&path, lines)))
    }
}
