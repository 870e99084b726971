//! Recency-aware asset selection.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use rand::seq::SliceRandom;
use reelpilot_core::{ReelPilotError, Result};

use crate::history::{UsageHistory, UsageRow};

/// Media extensions considered when listing a pool directory.
const MEDIA_EXTS: [&str; 5] = ["mp4", "mov", "png", "jpg", "jpeg"];

/// Recency window (K) for a resource class — how many of the account's
/// recent rows a handle must be absent from to count as fresh.
pub fn recency_window(category: &str) -> usize {
    match category {
        "hook" | "reaction" | "clip_pair" => 4,
        _ => 7,
    }
}

/// Stateful anti-repeat picker over a usage history.
pub struct AssetSelector {
    history: UsageHistory,
}

impl AssetSelector {
    pub fn new(history: UsageHistory) -> Self {
        Self { history }
    }

    /// Pick a handle for (category, account) that was not used in the
    /// account's recent runs. Falls back to the full pool once everything
    /// has been seen recently; an empty pool is the distinct NoAssets
    /// condition, never a panic inside a random choice.
    pub fn pick(&self, category: &str, account: &str, available: &[String]) -> Result<String> {
        self.pick_with_window(category, account, available, recency_window(category))
    }

    pub fn pick_with_window(
        &self,
        category: &str,
        account: &str,
        available: &[String],
        k: usize,
    ) -> Result<String> {
        if available.is_empty() {
            return Err(ReelPilotError::NoAssets(category.to_string()));
        }
        let recent = self.history.recent_handles(account, category, k);
        let fresh: Vec<&String> = available.iter().filter(|h| !recent.contains(*h)).collect();
        let mut rng = rand::thread_rng();
        let choice = if fresh.is_empty() {
            // Pool exhausted — repetition is accepted
            available.choose(&mut rng).unwrap()
        } else {
            *fresh.choose(&mut rng).unwrap()
        };
        tracing::debug!("Picked {category} asset for {account}: {choice}");
        Ok(choice.clone())
    }

    /// Pick a matched pair: both pools index clips by a shared session key,
    /// and the same key is returned for both lookups so the halves always
    /// belong together. The recency filter applies to the key intersection.
    pub fn pick_pair(
        &self,
        category: &str,
        account: &str,
        pool_a: &[String],
        pool_b: &[String],
    ) -> Result<String> {
        let keys_b: HashSet<&String> = pool_b.iter().collect();
        let common: Vec<String> = pool_a
            .iter()
            .filter(|k| keys_b.contains(*k))
            .cloned()
            .collect();
        self.pick(category, account, &common)
    }

    /// Record a use so later picks see it as recent.
    pub fn record_use(&self, account: &str, category: &str, handle: &str) -> Result<()> {
        self.history.append(UsageRow {
            date: Utc::now().format("%Y-%m-%d").to_string(),
            account: account.to_string(),
            category: category.to_string(),
            handle: handle.to_string(),
        })
    }
}

/// List the handles in a pool directory: media files, sorted by name,
/// dotfiles excluded.
pub fn list_handles(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut handles: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.'))
        .filter(|name| {
            Path::new(name)
                .extension()
                .and_then(|x| x.to_str())
                .map(|x| MEDIA_EXTS.contains(&x.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    handles.sort();
    handles
}
