//! # ReelPilot Assets
//!
//! Anti-repeat asset selection. Usage is tracked as an append-only row log;
//! the selector prefers handles an account has not used in its recent runs,
//! and falls back to the full pool once everything has been seen recently.
//! Matched pairs (two pools sharing a session key) are picked as one key so
//! both halves always come from the same take.

pub mod history;
pub mod selector;

pub use history::{UsageHistory, UsageRow};
pub use selector::{AssetSelector, list_handles, recency_window};
