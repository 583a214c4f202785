//! cloudflared ingress configuration.
//!
//! One YAML file per named tunnel. Rules are keyed by hostname; the
//! catch-all `http_status:404` rule is kept unique and last.

use crate::error::Result;
use crate::runtime::state::write_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const CATCH_ALL_SERVICE: &str = "http_status:404";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub service: String,
}

impl IngressRule {
    pub fn local(hostname: &str, port: u16) -> Self {
        Self {
            hostname: Some(hostname.to_string()),
            service: format!("http://localhost:{port}"),
        }
    }

    fn catch_all() -> Self {
        Self {
            hostname: None,
            service: CATCH_ALL_SERVICE.to_string(),
        }
    }

    fn is_catch_all(&self) -> bool {
        self.hostname.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressConfig {
    pub tunnel: String,
    #[serde(rename = "credentials-file")]
    pub credentials_file: PathBuf,
    #[serde(default)]
    pub ingress: Vec<IngressRule>,
}

impl IngressConfig {
    pub fn new(tunnel: &str, credentials_file: &Path) -> Self {
        Self {
            tunnel: tunnel.to_string(),
            credentials_file: credentials_file.to_path_buf(),
            ingress: vec![IngressRule::catch_all()],
        }
    }

    /// Read `path`, or `None` if it does not exist yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut config: Self = serde_yaml::from_str(&raw)?;
        config.normalize();
        Ok(Some(config))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        write_atomic(path, yaml.as_bytes())
    }

    /// Route `hostname` to `localhost:port`, replacing any existing rule for it.
    pub fn upsert(&mut self, hostname: &str, port: u16) {
        self.remove(hostname);
        self.ingress.push(IngressRule::local(hostname, port));
        self.normalize();
    }

    /// Drop the rule for `hostname`. Returns whether one existed.
    pub fn remove(&mut self, hostname: &str) -> bool {
        let before = self.ingress.len();
        self.ingress
            .retain(|rule| rule.hostname.as_deref() != Some(hostname));
        before != self.ingress.len()
    }

    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.ingress.iter().filter_map(|rule| rule.hostname.as_deref())
    }

    /// Collapse duplicate hostnames (last wins) and keep exactly one
    /// catch-all at the end; cloudflared rejects files without one.
    fn normalize(&mut self) {
        let mut rules: Vec<IngressRule> = Vec::with_capacity(self.ingress.len() + 1);
        for rule in self.ingress.drain(..).filter(|r| !r.is_catch_all()) {
            rules.retain(|existing| existing.hostname != rule.hostname);
            rules.push(rule);
        }
        rules.push(IngressRule::catch_all());
        self.ingress = rules;
    }
}
