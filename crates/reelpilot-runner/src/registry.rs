//! In-memory run status registry — queryable independently of the queue.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use reelpilot_core::RunStatus;

/// Everything tracked about one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub account: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    /// Combined subprocess output, appended incrementally.
    pub output: String,
    /// True for fire-and-forget runs (no serialization guarantee).
    pub detached: bool,
}

/// Map from run id to record. Records are retained for the process
/// lifetime; status transitions are monotonic.
pub struct RunRegistry {
    runs: Mutex<HashMap<String, RunRecord>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Create a Queued record and return its id.
    pub fn create(&self, account: &str, detached: bool) -> String {
        let id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let record = RunRecord {
            id: id.clone(),
            account: account.to_string(),
            status: RunStatus::Queued,
            started_at: Utc::now(),
            output: String::new(),
            detached,
        };
        self.runs.lock().unwrap().insert(id.clone(), record);
        id
    }

    /// Advance a run's status. Backward transitions and transitions out of
    /// a terminal state are ignored.
    pub fn set_status(&self, id: &str, status: RunStatus) {
        let mut runs = self.runs.lock().unwrap();
        if let Some(record) = runs.get_mut(id) {
            if record.status.is_terminal() || status.rank() < record.status.rank() {
                tracing::debug!(
                    "Ignoring status transition {} -> {} for run {id}",
                    record.status,
                    status
                );
                return;
            }
            record.status = status;
        }
    }

    /// Append subprocess output to a run.
    pub fn append_output(&self, id: &str, text: &str) {
        let mut runs = self.runs.lock().unwrap();
        if let Some(record) = runs.get_mut(id) {
            record.output.push_str(text);
        }
    }

    pub fn get(&self, id: &str) -> Option<RunRecord> {
        self.runs.lock().unwrap().get(id).cloned()
    }

    /// All known runs, oldest first.
    pub fn list(&self) -> Vec<RunRecord> {
        let runs = self.runs.lock().unwrap();
        let mut all: Vec<RunRecord> = runs.values().cloned().collect();
        all.sort_by(|a, b| (a.started_at, &a.id).cmp(&(b.started_at, &b.id)));
        all
    }

    /// All known runs with output truncated to a trailing window of
    /// `window` characters.
    pub fn list_tail(&self, window: usize) -> Vec<RunRecord> {
        self.list()
            .into_iter()
            .map(|mut record| {
                let chars = record.output.chars().count();
                if chars > window {
                    record.output = record.output.chars().skip(chars - window).collect();
                }
                record
            })
            .collect()
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}
