//! Workspace-wide error type.

use thiserror::Error;

/// Errors surfaced by the orchestrator crates.
#[derive(Error, Debug)]
pub enum ReelPilotError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Distinct "no resources" condition from the asset selector —
    /// an empty pool is not a programming error.
    #[error("No assets available in category '{0}'")]
    NoAssets(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Unknown run: {0}")]
    UnknownRun(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReelPilotError>;
