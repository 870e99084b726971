//! Schedule document — per-account trigger slots plus the global
//! recurrence rule, persisted as one JSON file and mutated through
//! partial patches.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use reelpilot_core::{ReelPilotError, Result};

/// One account's trigger slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSlot {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Trigger time of day, "HH:MM" UTC.
    #[serde(default = "default_time")]
    pub time_utc: String,
}

fn bool_true() -> bool {
    true
}
fn default_time() -> String {
    "06:30".into()
}

/// How often eligible accounts fire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekdays,
    EveryNDays,
    Custom,
}

/// Global recurrence rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recurrence {
    #[serde(default = "default_frequency")]
    pub frequency: Frequency,
    /// N for EveryNDays.
    #[serde(default = "default_interval")]
    pub interval_days: u32,
    /// Weekday set for Custom, 0 = Monday .. 6 = Sunday.
    #[serde(default = "all_days")]
    pub days_of_week: BTreeSet<u8>,
}

fn default_frequency() -> Frequency {
    Frequency::Daily
}
fn default_interval() -> u32 {
    2
}
fn all_days() -> BTreeSet<u8> {
    (0..=6).collect()
}

impl Default for Recurrence {
    fn default() -> Self {
        Self {
            frequency: default_frequency(),
            interval_days: default_interval(),
            days_of_week: all_days(),
        }
    }
}

impl Recurrence {
    /// Does the rule match this calendar day? Pure function of the date —
    /// no hidden counters, so re-evaluation is always consistent.
    pub fn matches(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday().num_days_from_monday() as u8;
        match self.frequency {
            Frequency::Daily => true,
            Frequency::Weekdays => weekday < 5,
            Frequency::EveryNDays => {
                self.interval_days > 0 && date.ordinal() % self.interval_days == 0
            }
            Frequency::Custom => self.days_of_week.contains(&weekday),
        }
    }
}

/// The whole schedule document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountSlot>,
    #[serde(default)]
    pub recurrence: Recurrence,
}

/// Strict "HH:MM" parse; returns (hour, minute) or None.
pub fn parse_time_utc(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

/// Partial update for one account. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountPatch {
    pub enabled: Option<bool>,
    pub time_utc: Option<String>,
}

/// Partial update for the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulePatch {
    pub frequency: Option<Frequency>,
    pub interval_days: Option<u32>,
    pub days_of_week: Option<BTreeSet<u8>>,
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountPatch>,
}

impl ScheduleConfig {
    /// Apply a partial patch. Unknown accounts are ignored; an invalid
    /// time_utc is dropped individually and the previous value kept.
    pub fn apply_patch(&mut self, patch: &SchedulePatch) {
        if let Some(freq) = patch.frequency {
            self.recurrence.frequency = freq;
        }
        if let Some(n) = patch.interval_days {
            self.recurrence.interval_days = n;
        }
        if let Some(days) = &patch.days_of_week {
            self.recurrence.days_of_week = days.iter().copied().filter(|d| *d <= 6).collect();
        }
        for (name, account_patch) in &patch.accounts {
            let Some(slot) = self.accounts.get_mut(name) else {
                tracing::warn!("Ignoring patch for unknown account '{name}'");
                continue;
            };
            if let Some(enabled) = account_patch.enabled {
                slot.enabled = enabled;
            }
            if let Some(time) = &account_patch.time_utc {
                if parse_time_utc(time).is_some() {
                    slot.time_utc = time.clone();
                } else {
                    tracing::warn!("Dropping invalid time_utc '{time}' for account '{name}'");
                }
            }
        }
    }
}

/// File-backed schedule store. Reads are snapshot-based; writes are
/// serialized behind a mutex (single-writer discipline).
pub struct ScheduleStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ScheduleStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Load the document. A missing file is an empty default schedule;
    /// a corrupt file is an error so callers can no-op instead of firing
    /// off a bogus empty schedule.
    pub fn load(&self) -> Result<ScheduleConfig> {
        if !self.path.exists() {
            return Ok(ScheduleConfig::default());
        }
        let json = std::fs::read_to_string(&self.path)
            .map_err(|e| ReelPilotError::Store(format!("Failed to read schedule: {e}")))?;
        serde_json::from_str(&json)
            .map_err(|e| ReelPilotError::Store(format!("Failed to parse schedule: {e}")))
    }

    pub fn save(&self, config: &ScheduleConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, json)?;
        tracing::debug!("Saved schedule to {}", self.path.display());
        Ok(())
    }

    /// Read-modify-write under the store's write lock.
    pub fn update(&self, patch: &SchedulePatch) -> Result<ScheduleConfig> {
        let _guard = self.write_lock.lock().unwrap();
        let mut config = self.load()?;
        config.apply_patch(patch);
        self.save(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config_with_account(name: &str, time: &str) -> ScheduleConfig {
        let mut config = ScheduleConfig::default();
        config.accounts.insert(
            name.into(),
            AccountSlot {
                enabled: true,
                time_utc: time.into(),
            },
        );
        config
    }

    #[test]
    fn test_parse_time_utc() {
        assert_eq!(parse_time_utc("06:30"), Some((6, 30)));
        assert_eq!(parse_time_utc("23:59"), Some((23, 59)));
        assert_eq!(parse_time_utc("24:00"), None);
        assert_eq!(parse_time_utc("6:30"), None);
        assert_eq!(parse_time_utc("06:60"), None);
        assert_eq!(parse_time_utc("garbage"), None);
    }

    #[test]
    fn test_weekdays_never_match_weekend() {
        let recurrence = Recurrence {
            frequency: Frequency::Weekdays,
            ..Default::default()
        };
        // 2026-08-01 is a Saturday, 2026-08-02 a Sunday, 2026-08-03 a Monday
        assert!(!recurrence.matches(date(2026, 8, 1)));
        assert!(!recurrence.matches(date(2026, 8, 2)));
        assert!(recurrence.matches(date(2026, 8, 3)));
    }

    #[test]
    fn test_every_n_days_is_pure_day_of_year_parity() {
        let recurrence = Recurrence {
            frequency: Frequency::EveryNDays,
            interval_days: 2,
            ..Default::default()
        };
        let jan1 = date(2026, 1, 1); // ordinal 1
        let jan2 = date(2026, 1, 2); // ordinal 2
        assert!(!recurrence.matches(jan1));
        assert!(recurrence.matches(jan2));
        // Deterministic: same date, same answer, no hidden counter
        assert_eq!(recurrence.matches(jan2), recurrence.matches(jan2));
        // Exactly every other day
        assert!(!recurrence.matches(date(2026, 1, 3)));
        assert!(recurrence.matches(date(2026, 1, 4)));
    }

    #[test]
    fn test_every_n_days_zero_interval_never_matches() {
        let recurrence = Recurrence {
            frequency: Frequency::EveryNDays,
            interval_days: 0,
            ..Default::default()
        };
        assert!(!recurrence.matches(date(2026, 1, 2)));
    }

    #[test]
    fn test_custom_days() {
        let recurrence = Recurrence {
            frequency: Frequency::Custom,
            days_of_week: [0u8, 4].into_iter().collect(), // Mon, Fri
            ..Default::default()
        };
        assert!(recurrence.matches(date(2026, 8, 3))); // Monday
        assert!(!recurrence.matches(date(2026, 8, 4))); // Tuesday
        assert!(recurrence.matches(date(2026, 8, 7))); // Friday
    }

    #[test]
    fn test_patch_unknown_account_ignored() {
        let mut config = config_with_account("acct-1", "06:30");
        let mut patch = SchedulePatch::default();
        patch.accounts.insert(
            "ghost".into(),
            AccountPatch {
                enabled: Some(false),
                time_utc: None,
            },
        );
        config.apply_patch(&patch);
        assert_eq!(config.accounts.len(), 1);
        assert!(config.accounts["acct-1"].enabled);
    }

    #[test]
    fn test_patch_invalid_time_dropped_individually() {
        let mut config = config_with_account("acct-1", "06:30");
        config.accounts.insert(
            "acct-2".into(),
            AccountSlot {
                enabled: true,
                time_utc: "09:00".into(),
            },
        );
        let mut patch = SchedulePatch::default();
        patch.accounts.insert(
            "acct-1".into(),
            AccountPatch {
                enabled: None,
                time_utc: Some("25:99".into()),
            },
        );
        patch.accounts.insert(
            "acct-2".into(),
            AccountPatch {
                enabled: None,
                time_utc: Some("10:15".into()),
            },
        );
        config.apply_patch(&patch);
        // Rejected update leaves the previous value untouched
        assert_eq!(config.accounts["acct-1"].time_utc, "06:30");
        // The valid sibling update still lands
        assert_eq!(config.accounts["acct-2"].time_utc, "10:15");
    }

    #[test]
    fn test_store_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(dir.path().join("schedule.json"));
        let config = store.load().unwrap();
        assert!(config.accounts.is_empty());
    }

    #[test]
    fn test_store_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(&path, "{broken").unwrap();
        let store = ScheduleStore::new(path);
        assert!(store.load().is_err());
    }

    #[test]
    fn test_store_update_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(dir.path().join("schedule.json"));
        store.save(&config_with_account("acct-1", "06:30")).unwrap();

        let mut patch = SchedulePatch::default();
        patch.frequency = Some(Frequency::Weekdays);
        patch.accounts.insert(
            "acct-1".into(),
            AccountPatch {
                enabled: Some(false),
                time_utc: Some("07:45".into()),
            },
        );
        let updated = store.update(&patch).unwrap();
        assert_eq!(updated.recurrence.frequency, Frequency::Weekdays);
        assert!(!updated.accounts["acct-1"].enabled);
        assert_eq!(updated.accounts["acct-1"].time_utc, "07:45");

        // Persisted
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.accounts["acct-1"].time_utc, "07:45");
    }
}
