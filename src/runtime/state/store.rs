//! Tunnel record storage
//!
//! One JSON file per tunnel name under `<state>/tunnels/`. Writes go through
//! a temp file in the same directory followed by a rename, so readers in
//! other invocations only ever see complete records.

use super::TunnelRecord;
use crate::error::{Result, TunnelError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const RECORD_EXTENSION: &str = "json";

/// Validate tunnel name (lowercase DNS label: letters, digits, single hyphens)
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| TunnelError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if name.len() > 63 {
        return Err(invalid("name must be at most 63 characters"));
    }
    // Names become DNS labels of routed hostnames; anything a label would
    // rewrite could collide with another name.
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "only lowercase ASCII letters, digits and hyphens are allowed",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
        return Err(invalid(
            "hyphens must separate letters or digits (no leading, trailing or doubled hyphen)",
        ));
    }
    Ok(())
}

/// Durable name → record map. Nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct TunnelStore {
    dir: PathBuf,
}

impl TunnelStore {
    /// Open (creating if needed) the record directory under `state_dir`.
    pub fn open(state_dir: &Path) -> Result<Self> {
        let dir = state_dir.join("tunnels");
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{RECORD_EXTENSION}"))
    }

    /// Insert or replace the record for `record.name`.
    pub fn put(&self, record: &TunnelRecord) -> Result<()> {
        validate_name(&record.name)?;
        let json = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.record_path(&record.name), &json)
    }

    pub fn get(&self, name: &str) -> Result<Option<TunnelRecord>> {
        validate_name(name)?;
        read_record(&self.record_path(name))
    }

    /// Remove the record. Returns whether one existed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        match fs::remove_file(self.record_path(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// All records sorted by name. Unreadable files are skipped with a warning.
    pub fn list(&self) -> Result<Vec<TunnelRecord>> {
        let mut records = Vec::new();
        for path in self.record_files()? {
            match read_record(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "skipping unreadable tunnel record");
                }
            }
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Delete every record file, readable or not. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.record_files()? {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    fn record_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some(RECORD_EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

fn read_record(path: &Path) -> Result<Option<TunnelRecord>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Replace `path` with `content` via a temp file and rename in the same directory.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Dot-prefixed and without the record extension, so `list` never sees it.
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));
    fs::write(&temp_path, content)?;

    if let Err(rename_error) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(rename_error.into());
    }

    Ok(())
}
