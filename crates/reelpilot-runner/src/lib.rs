//! # ReelPilot Runner
//!
//! Executes generation pipeline runs as subprocesses. The queued path is
//! the hard guarantee: one long-lived worker drains a FIFO queue and runs
//! each request to full subprocess exit before the next, so the downstream
//! generation backend never sees two concurrent runs. A detached
//! fire-and-forget path exists for lower-stakes flows with the same status
//! tracking but no serialization.
//!
//! Output is streamed into the run record as it arrives, so a mid-run
//! status query sees partial output. One failed run never blocks the queue.

pub mod registry;
pub mod runlog;
pub mod service;

pub use registry::{RunRecord, RunRegistry};
pub use runlog::{RunLog, RunLogEntry};
pub use service::RunService;
