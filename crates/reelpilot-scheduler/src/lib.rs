//! # ReelPilot Scheduler
//!
//! The dispatch engine: once per minute it evaluates the schedule document
//! against the current time and decides which accounts fire now. A per
//! (account, day) lock file makes the decision idempotent — re-evaluating
//! the same minute, or any later minute of the same day, is a no-op.
//!
//! ## Flow
//! ```text
//! tick(now)
//!   ├── load schedule.json          (warn + no-op on read failure)
//!   ├── recurrence match for today  (daily / weekdays / every-N-days / custom)
//!   ├── per enabled account: time-of-day == now@minute?
//!   │     └── atomic lock create → FireDecision
//!   └── sweep locks past retention
//! ```

pub mod dispatch;
pub mod history;
pub mod locks;
pub mod schedule;

pub use dispatch::{Dispatcher, FireDecision, spawn_dispatcher};
pub use history::{AttemptAction, DispatchAttempt, DispatchHistory};
pub use locks::LockStore;
pub use schedule::{
    AccountPatch, AccountSlot, Frequency, Recurrence, ScheduleConfig, SchedulePatch,
    ScheduleStore,
};
