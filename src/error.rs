//! The one recoverable error surface in this crate: config validation.
//!
//! Everything past construction (double-run, continuation-after-run, arena
//! or deque overflow) is documented API misuse — it is logged through the
//! configured [`crate::logger::LogSink`] and, in debug builds, asserted —
//! rather than threaded through as a `Result`, because a shared scheduler
//! must not let one caller's mistake unwind another caller's in-flight work.

use thiserror::Error;

/// Invalid [`crate::SchedulerConfig`] values caught before a [`crate::Scheduler`]
/// is constructed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_tasks_per_worker must be a power of two, got {0}")]
    TaskCapacityNotPowerOfTwo(usize),

    #[error("max_tasks_per_worker must be at least 1")]
    ZeroTaskCapacity,
}
