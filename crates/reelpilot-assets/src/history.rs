//! Asset usage history — append-only JSONL row log with a bounded
//! trailing window. Rows are never mutated in place; the file is rewritten
//! with only the trailing window on each append.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use reelpilot_core::Result;

/// One asset use: which account used which handle of which category, when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRow {
    /// Calendar day, "YYYY-MM-DD".
    pub date: String,
    pub account: String,
    pub category: String,
    pub handle: String,
}

/// File-backed usage log.
pub struct UsageHistory {
    path: PathBuf,
    /// Maximum rows retained on disk.
    window: usize,
    write_lock: Mutex<()>,
}

const DEFAULT_WINDOW: usize = 200;

impl UsageHistory {
    pub fn new(path: PathBuf) -> Self {
        Self::with_window(path, DEFAULT_WINDOW)
    }

    pub fn with_window(path: PathBuf, window: usize) -> Self {
        Self {
            path,
            window,
            write_lock: Mutex::new(()),
        }
    }

    /// Load all retained rows, oldest first. Unparseable lines are skipped.
    pub fn load(&self) -> Vec<UsageRow> {
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
                tracing::warn!("Failed to read asset usage log: {e}");
                Vec::new()
            }
        }
    }

    /// Append a row and truncate the log to the trailing window.
    pub fn append(&self, row: UsageRow) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        let mut rows = self.load();
        rows.push(row);
        let start = rows.len().saturating_sub(self.window);
        let mut out = String::new();
        for r in &rows[start..] {
            out.push_str(&serde_json::to_string(r)?);
            out.push('\n');
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, out)?;
        Ok(())
    }

    /// Handles this (account, category) used in its last `k` rows.
    pub fn recent_handles(&self, account: &str, category: &str, k: usize) -> HashSet<String> {
        let rows = self.load();
        let mine: Vec<&UsageRow> = rows
            .iter()
            .filter(|r| r.account == account && r.category == category)
            .collect();
        let start = mine.len().saturating_sub(k);
        mine[start..].iter().map(|r| r.handle.clone()).collect()
    }
}
