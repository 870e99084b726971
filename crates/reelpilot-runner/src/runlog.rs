//! Append-only run-history log. The schedule surface joins this back to
//! slots as per-account last-run timestamp/status.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reelpilot_core::{Result, RunStatus};

/// One completed (or skipped) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub account: String,
    pub run_id: String,
    pub status: RunStatus,
}

/// JSONL log, pure append.
pub struct RunLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RunLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn append(&self, entry: &RunLogEntry) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// All entries, oldest first. Unparseable lines are skipped.
    pub fn load(&self) -> Vec<RunLogEntry> {
        if !self.path.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(content) => content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .filter_map(|l| serde_json::from_str(l).ok())
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to read run log: {e}");
                Vec::new()
            }
        }
    }

    /// Most recent entry per account.
    pub fn last_by_account(&self) -> HashMap<String, RunLogEntry> {
        let mut last = HashMap::new();
        for entry in self.load() {
            last.insert(entry.account.clone(), entry);
        }
        last
    }
}
