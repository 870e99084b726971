//! The dispatcher — evaluates the schedule once per minute and emits
//! fire decisions, at most one per account per calendar day.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::history::{AttemptAction, DispatchAttempt, DispatchHistory};
use crate::locks::LockStore;
use crate::schedule::ScheduleStore;

/// The dispatcher's determination that an account's pipeline should run now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireDecision {
    pub account: String,
    pub time_utc: String,
}

/// Minute-resolution dispatch engine. `tick` is a function of the schedule
/// document, the lock set, and `now`; its only side effects are lock
/// creation, attempt-history rows, and the lock sweep. Safe to call once
/// per minute indefinitely.
pub struct Dispatcher {
    schedule: Arc<ScheduleStore>,
    locks: LockStore,
    history: Arc<DispatchHistory>,
    retention_days: u32,
}

impl Dispatcher {
    pub fn new(
        schedule: Arc<ScheduleStore>,
        locks: LockStore,
        history: Arc<DispatchHistory>,
        retention_days: u32,
    ) -> Self {
        Self {
            schedule,
            locks,
            history,
            retention_days,
        }
    }

    /// One evaluation against `now`. Re-evaluating the same minute — or any
    /// later minute of the same day — never fires an account twice: the
    /// lock marker created on the first match makes the decision idempotent.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<FireDecision> {
        let config = match self.schedule.load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Schedule unreadable, skipping tick: {e}");
                return Vec::new();
            }
        };

        let today = now.date_naive();
        let date = today.format("%Y-%m-%d").to_string();
        let hhmm = now.format("%H:%M").to_string();
        let mut decisions = Vec::new();

        if config.recurrence.matches(today) {
            for (account, slot) in &config.accounts {
                if !slot.enabled {
                    tracing::debug!("SKIP: {account} disabled");
                    continue;
                }
                if slot.time_utc != hhmm {
                    continue;
                }
                if self.locks.is_locked(account, &date) {
                    tracing::info!("SKIP: {account} already ran today");
                    self.record(now, account, AttemptAction::Skipped, "already fired today");
                    continue;
                }
                if !self.locks.acquire(account, &date, now) {
                    // Lost the create race to an overlapping tick
                    self.record(now, account, AttemptAction::Skipped, "lock already present");
                    continue;
                }
                tracing::info!("FIRE: {account} at {hhmm}");
                self.record(now, account, AttemptAction::Fired, "time match");
                decisions.push(FireDecision {
                    account: account.clone(),
                    time_utc: slot.time_utc.clone(),
                });
            }
        } else {
            tracing::debug!(
                "SKIP: not scheduled today (frequency {:?})",
                config.recurrence.frequency
            );
        }

        self.locks.sweep(now, self.retention_days);
        decisions
    }

    fn record(&self, now: DateTime<Utc>, account: &str, action: AttemptAction, detail: &str) {
        let attempt = DispatchAttempt {
            timestamp: now,
            account: account.to_string(),
            action,
            detail: detail.to_string(),
        };
        if let Err(e) = self.history.record(attempt) {
            tracing::warn!("Failed to record dispatch attempt: {e}");
        }
    }
}

/// Periodic dispatcher loop. Each fire decision is handed to `on_fire`
/// (the binary wires this to the run queue).
pub async fn spawn_dispatcher<F, Fut>(dispatcher: Arc<Dispatcher>, interval_secs: u64, on_fire: F)
where
    F: Fn(FireDecision) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tracing::info!("Dispatcher started (check every {interval_secs}s)");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        let decisions = dispatcher.tick(Utc::now());
        for decision in decisions {
            on_fire(decision).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{AccountSlot, Frequency, Recurrence, ScheduleConfig};
    use chrono::TimeZone;

    struct Fixture {
        _dir: tempfile::TempDir,
        dispatcher: Dispatcher,
        history: Arc<DispatchHistory>,
    }

    fn fixture(config: &ScheduleConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let schedule = Arc::new(ScheduleStore::new(dir.path().join("schedule.json")));
        schedule.save(config).unwrap();
        let history = Arc::new(DispatchHistory::new(dir.path().join("history.json")));
        let dispatcher = Dispatcher::new(
            schedule,
            LockStore::new(dir.path().join("locks")),
            history.clone(),
            7,
        );
        Fixture {
            _dir: dir,
            dispatcher,
            history,
        }
    }

    fn daily_config(account: &str, time: &str) -> ScheduleConfig {
        let mut config = ScheduleConfig::default();
        config.accounts.insert(
            account.into(),
            AccountSlot {
                enabled: true,
                time_utc: time.into(),
            },
        );
        config
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        // 2026-08-05 is a Wednesday
        Utc.with_ymd_and_hms(2026, 8, 5, h, m, s).unwrap()
    }

    #[test]
    fn test_fires_once_then_locks_out_same_minute() {
        let fx = fixture(&daily_config("acct-1", "06:30"));
        let decisions = fx.dispatcher.tick(at(6, 30, 0));
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].account, "acct-1");

        // Same minute, later second — truncation matches but the lock holds
        assert!(fx.dispatcher.tick(at(6, 30, 59)).is_empty());
    }

    #[test]
    fn test_double_tick_same_instant_fires_once() {
        let fx = fixture(&daily_config("acct-1", "06:30"));
        let first = fx.dispatcher.tick(at(6, 30, 0));
        let second = fx.dispatcher.tick(at(6, 30, 0));
        assert_eq!(first.len() + second.len(), 1);
    }

    #[test]
    fn test_no_fire_outside_the_minute() {
        let fx = fixture(&daily_config("acct-1", "06:30"));
        assert!(fx.dispatcher.tick(at(6, 29, 59)).is_empty());
        assert!(fx.dispatcher.tick(at(6, 31, 0)).is_empty());
    }

    #[test]
    fn test_disabled_account_never_fires() {
        let mut config = daily_config("acct-1", "06:30");
        config.accounts.get_mut("acct-1").unwrap().enabled = false;
        let fx = fixture(&config);
        assert!(fx.dispatcher.tick(at(6, 30, 0)).is_empty());
    }

    #[test]
    fn test_weekdays_recurrence_skips_weekend() {
        let mut config = daily_config("acct-1", "06:30");
        config.recurrence = Recurrence {
            frequency: Frequency::Weekdays,
            ..Default::default()
        };
        let fx = fixture(&config);
        // 2026-08-01 Saturday, 2026-08-02 Sunday
        let saturday = Utc.with_ymd_and_hms(2026, 8, 1, 6, 30, 0).unwrap();
        let sunday = Utc.with_ymd_and_hms(2026, 8, 2, 6, 30, 0).unwrap();
        assert!(fx.dispatcher.tick(saturday).is_empty());
        assert!(fx.dispatcher.tick(sunday).is_empty());
        // Monday fires
        let monday = Utc.with_ymd_and_hms(2026, 8, 3, 6, 30, 0).unwrap();
        assert_eq!(fx.dispatcher.tick(monday).len(), 1);
    }

    #[test]
    fn test_multiple_accounts_fire_independently() {
        let mut config = daily_config("acct-1", "06:30");
        config.accounts.insert(
            "acct-2".into(),
            AccountSlot {
                enabled: true,
                time_utc: "06:30".into(),
            },
        );
        config.accounts.insert(
            "acct-3".into(),
            AccountSlot {
                enabled: true,
                time_utc: "07:00".into(),
            },
        );
        let fx = fixture(&config);
        let at_630 = fx.dispatcher.tick(at(6, 30, 0));
        assert_eq!(at_630.len(), 2);
        let at_700 = fx.dispatcher.tick(at(7, 0, 0));
        assert_eq!(at_700.len(), 1);
        assert_eq!(at_700[0].account, "acct-3");
    }

    #[test]
    fn test_corrupt_schedule_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(&path, "{broken").unwrap();
        let history = Arc::new(DispatchHistory::new(dir.path().join("history.json")));
        let dispatcher = Dispatcher::new(
            Arc::new(ScheduleStore::new(path)),
            LockStore::new(dir.path().join("locks")),
            history,
            7,
        );
        assert!(dispatcher.tick(at(6, 30, 0)).is_empty());
    }

    #[test]
    fn test_attempts_are_recorded() {
        let fx = fixture(&daily_config("acct-1", "06:30"));
        fx.dispatcher.tick(at(6, 30, 0));
        fx.dispatcher.tick(at(6, 30, 30));
        let attempts = fx.history.load();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].action, AttemptAction::Fired);
        assert_eq!(attempts[1].action, AttemptAction::Skipped);
    }

    #[test]
    fn test_next_day_fires_again() {
        let fx = fixture(&daily_config("acct-1", "06:30"));
        assert_eq!(fx.dispatcher.tick(at(6, 30, 0)).len(), 1);
        let next_day = Utc.with_ymd_and_hms(2026, 8, 6, 6, 30, 0).unwrap();
        assert_eq!(fx.dispatcher.tick(next_day).len(), 1);
    }
}
