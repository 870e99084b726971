//! # ReelPilot Spend Ledger
//!
//! Date-keyed spend accumulator consulted before and updated after costly
//! operations. One flat JSON document (`daily_spend.json`), re-read on every
//! call so a ledger written by another process is still observed — advisory
//! across processes, serialized behind a mutex within this one.
//!
//! Callers `admit` immediately before starting a costly operation and
//! `record` immediately after, so a partially-failed operation's real cost
//! is still captured.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use reelpilot_core::Result;

/// Daily spend ledger with a fixed aggregate cap.
pub struct SpendLedger {
    path: PathBuf,
    cap: f64,
    write_lock: Mutex<()>,
}

impl SpendLedger {
    pub fn new(path: PathBuf, cap: f64) -> Self {
        Self {
            path,
            cap,
            write_lock: Mutex::new(()),
        }
    }

    /// The configured daily cap in USD.
    pub fn cap(&self) -> f64 {
        self.cap
    }

    /// Would spending `estimate` today stay within the cap?
    /// Comparison uses unrounded accumulated values.
    pub fn admit(&self, estimate: f64) -> bool {
        self.admit_on(today(), estimate)
    }

    /// Add `amount` to today's total and persist.
    pub fn record(&self, amount: f64) -> Result<()> {
        self.record_on(today(), amount)
    }

    /// Today's accumulated spend.
    pub fn spent_today(&self) -> f64 {
        self.spent_on(today())
    }

    pub fn admit_on(&self, date: NaiveDate, estimate: f64) -> bool {
        self.spent_on(date) + estimate <= self.cap
    }

    pub fn spent_on(&self, date: NaiveDate) -> f64 {
        self.read_entries()
            .get(&date_key(date))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn record_on(&self, date: NaiveDate, amount: f64) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_entries();
        let key = date_key(date);
        let total = entries.get(&key).copied().unwrap_or(0.0) + amount.max(0.0);
        entries.insert(key, total);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&self.path, json)?;
        tracing::info!("Daily spend: ${:.2} / ${:.2} cap", total, self.cap);
        Ok(())
    }

    /// Read the ledger document. Missing or corrupt files read as empty.
    fn read_entries(&self) -> BTreeMap<String, f64> {
        if !self.path.exists() {
            return BTreeMap::new();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse spend ledger: {e}");
                BTreeMap::new()
            }),
            Err(e) => {
                tracing::warn!("Failed to read spend ledger: {e}");
                BTreeMap::new()
            }
        }
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(cap: f64) -> (tempfile::TempDir, SpendLedger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SpendLedger::new(dir.path().join("daily_spend.json"), cap);
        (dir, ledger)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    #[test]
    fn test_second_operation_denied_at_cap() {
        let (_dir, ledger) = ledger(5.00);
        assert!(ledger.admit_on(day(), 3.00));
        ledger.record_on(day(), 3.00).unwrap();
        assert!(!ledger.admit_on(day(), 3.00));
    }

    #[test]
    fn test_exact_cap_is_admitted() {
        let (_dir, ledger) = ledger(5.00);
        ledger.record_on(day(), 2.50).unwrap();
        assert!(ledger.admit_on(day(), 2.50));
        ledger.record_on(day(), 2.50).unwrap();
        assert!(!ledger.admit_on(day(), 0.01));
    }

    #[test]
    fn test_days_accumulate_independently() {
        let (_dir, ledger) = ledger(5.00);
        ledger.record_on(day(), 4.00).unwrap();
        let next = day().succ_opt().unwrap();
        assert_eq!(ledger.spent_on(next), 0.0);
        assert!(ledger.admit_on(next, 4.00));
    }

    #[test]
    fn test_comparison_is_unrounded() {
        let (_dir, ledger) = ledger(5.00);
        // 4.996 displays as 5.00 but must still admit 0.004
        ledger.record_on(day(), 4.996).unwrap();
        assert!(ledger.admit_on(day(), 0.004));
        assert!(!ledger.admit_on(day(), 0.005));
    }

    #[test]
    fn test_negative_amounts_are_clamped() {
        let (_dir, ledger) = ledger(5.00);
        ledger.record_on(day(), 2.00).unwrap();
        ledger.record_on(day(), -1.00).unwrap();
        assert_eq!(ledger.spent_on(day()), 2.00);
    }

    #[test]
    fn test_missing_file_reads_as_zero() {
        let (_dir, ledger) = ledger(5.00);
        assert_eq!(ledger.spent_on(day()), 0.0);
        assert!(ledger.admit_on(day(), 5.00));
    }

    #[test]
    fn test_ledger_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daily_spend.json");
        SpendLedger::new(path.clone(), 5.00)
            .record_on(day(), 3.00)
            .unwrap();
        let reopened = SpendLedger::new(path, 5.00);
        assert_eq!(reopened.spent_on(day()), 3.00);
    }
}
