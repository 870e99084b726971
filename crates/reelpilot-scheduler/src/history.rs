//! Bounded trailing history of dispatch attempts, surfaced by the
//! schedule read API.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reelpilot_core::Result;

/// What the dispatcher did for an account on a tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptAction {
    Fired,
    Skipped,
}

/// One dispatch attempt row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchAttempt {
    pub timestamp: DateTime<Utc>,
    pub account: String,
    pub action: AttemptAction,
    pub detail: String,
}

/// File-backed attempt ring — keeps the trailing `limit` rows.
pub struct DispatchHistory {
    path: PathBuf,
    limit: usize,
    write_lock: Mutex<()>,
}

const DEFAULT_LIMIT: usize = 50;

impl DispatchHistory {
    pub fn new(path: PathBuf) -> Self {
        Self::with_limit(path, DEFAULT_LIMIT)
    }

    pub fn with_limit(path: PathBuf, limit: usize) -> Self {
        Self {
            path,
            limit,
            write_lock: Mutex::new(()),
        }
    }

    /// Load retained attempts, oldest first.
    pub fn load(&self) -> Vec<DispatchAttempt> {
        if !self.path.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse dispatch history: {e}");
                Vec::new()
            }),
            Err(e) => {
                tracing::warn!("Failed to read dispatch history: {e}");
                Vec::new()
            }
        }
    }

    /// Append an attempt, truncating to the trailing limit.
    pub fn record(&self, attempt: DispatchAttempt) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        let mut attempts = self.load();
        attempts.push(attempt);
        let start = attempts.len().saturating_sub(self.limit);
        let retained = &attempts[start..];
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&retained)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(account: &str, action: AttemptAction) -> DispatchAttempt {
        DispatchAttempt {
            timestamp: Utc::now(),
            account: account.into(),
            action,
            detail: String::new(),
        }
    }

    #[test]
    fn test_record_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let history = DispatchHistory::new(dir.path().join("history.json"));
        history.record(attempt("acct-1", AttemptAction::Fired)).unwrap();
        history
            .record(attempt("acct-1", AttemptAction::Skipped))
            .unwrap();
        let attempts = history.load();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].action, AttemptAction::Fired);
    }

    #[test]
    fn test_trailing_limit() {
        let dir = tempfile::tempdir().unwrap();
        let history = DispatchHistory::with_limit(dir.path().join("history.json"), 3);
        for i in 0..6 {
            history
                .record(attempt(&format!("acct-{i}"), AttemptAction::Fired))
                .unwrap();
        }
        let attempts = history.load();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].account, "acct-3");
        assert_eq!(attempts[2].account, "acct-5");
    }
}
