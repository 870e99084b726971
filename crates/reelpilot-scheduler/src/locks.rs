//! Dispatch lock markers — one file per (account, calendar day).
//!
//! Existence strictly implies "already fired/firing today". Creation uses
//! `create_new` so two overlapping ticks racing on the same marker resolve
//! to exactly one winner. Safe to destroy any time after the day ends; a
//! periodic sweep removes markers past the retention window.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};

/// Directory of lock marker files.
pub struct LockStore {
    dir: PathBuf,
}

impl LockStore {
    pub fn new(dir: PathBuf) -> Self {
        std::fs::create_dir_all(&dir).ok();
        Self { dir }
    }

    fn path_for(&self, account: &str, date: &str) -> PathBuf {
        self.dir.join(format!("{account}_{date}.lock"))
    }

    /// Has this account already fired on this day?
    pub fn is_locked(&self, account: &str, date: &str) -> bool {
        self.path_for(account, date).exists()
    }

    /// Atomically create the marker. Returns false when it already exists
    /// (someone else fired) or the marker cannot be created — the caller
    /// must not fire in either case.
    pub fn acquire(&self, account: &str, date: &str, now: DateTime<Utc>) -> bool {
        let path = self.path_for(account, date);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                if let Err(e) = file.write_all(now.to_rfc3339().as_bytes()) {
                    tracing::warn!("Failed to stamp lock {}: {e}", path.display());
                }
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => false,
            Err(e) => {
                tracing::warn!("Failed to create lock {}: {e}", path.display());
                false
            }
        }
    }

    /// Remove markers whose creation stamp is older than the retention
    /// window. Markers with unreadable stamps are left alone.
    pub fn sweep(&self, now: DateTime<Utc>, retention_days: u32) {
        let cutoff = now - Duration::days(i64::from(retention_days));
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|x| x.to_str()) != Some("lock") {
                continue;
            }
            if let Some(stamp) = read_stamp(&path)
                && stamp < cutoff
            {
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::warn!("Failed to remove stale lock {}: {e}", path.display());
                } else {
                    tracing::debug!("Swept stale lock {}", path.display());
                }
            }
        }
    }
}

fn read_stamp(path: &Path) -> Option<DateTime<Utc>> {
    let text = std::fs::read_to_string(path).ok()?;
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
