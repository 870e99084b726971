//! Run request and status types shared across crates.

use serde::{Deserialize, Serialize};

/// A request to run the generation pipeline for one account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    /// Target account (publishing destination).
    pub account: String,
    /// Generate everything but do not post or spend.
    #[serde(default)]
    pub dry_run: bool,
    /// Skip the cloud upload step.
    #[serde(default)]
    pub skip_upload: bool,
    /// Skip the secondary (reaction) segment.
    #[serde(default)]
    pub skip_secondary: bool,
    /// Free-text override for the hook segment.
    #[serde(default)]
    pub hook_text: Option<String>,
    /// Free-text override for the reaction segment.
    #[serde(default)]
    pub reaction_text: Option<String>,
}

impl RunRequest {
    /// New request for an account with default flags.
    pub fn for_account(account: &str) -> Self {
        Self {
            account: account.to_string(),
            ..Default::default()
        }
    }
}

/// Lifecycle status of a pipeline run. Transitions are monotonic:
/// Queued → Running → (Completed | Failed), or straight to Skipped
/// when admission control denies the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    /// Denied by the daily spend cap — distinct from a crash.
    Skipped,
    Completed,
    Failed,
}

impl RunStatus {
    /// Position in the lifecycle; a status never moves backwards.
    pub fn rank(self) -> u8 {
        match self {
            RunStatus::Queued => 0,
            RunStatus::Running => 1,
            RunStatus::Skipped | RunStatus::Completed | RunStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Queued => write!(f, "queued"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Skipped => write!(f, "skipped"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}
