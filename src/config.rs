//! Scheduler sizing: worker count, per-worker task arena capacity, and the
//! logging sink. Kept separate from the actual network/DB/CLI configuration
//! of the surrounding gateway process, which is out of scope for this crate.

use std::sync::Arc;

use crate::error::ConfigError;
use crate::logger::{default_sink, LogSink};

/// Default per-worker task arena / deque capacity. A power of two so index
/// wrapping in the arena and deque is a cheap mask.
pub const DEFAULT_MAX_TASKS_PER_WORKER: usize = 4096;

/// Sizing and wiring for a [`crate::Scheduler`].
///
/// Construct with [`SchedulerConfig::new`] or [`SchedulerConfig::default`],
/// validate with [`SchedulerConfig::validate`], then pass to
/// [`crate::Scheduler::new`] (which re-validates and panics on failure —
/// `validate` exists so callers building config from untrusted input, e.g. a
/// config file, get a recoverable error instead).
pub struct SchedulerConfig {
    pub workers: usize,
    pub max_tasks_per_worker: usize,
    pub logger: Arc<dyn LogSink>,
}

impl SchedulerConfig {
    /// `workers == 0` means "use one thread per available CPU".
    pub fn new(workers: usize, max_tasks_per_worker: usize) -> Self {
        Self {
            workers,
            max_tasks_per_worker,
            logger: default_sink(),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn LogSink>) -> Self {
        self.logger = logger;
        self
    }

    /// Resolve `workers == 0` to the host's CPU count, as the teacher
    /// runtime does for its own default pool sizing.
    pub(crate) fn resolved_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tasks_per_worker == 0 {
            return Err(ConfigError::ZeroTaskCapacity);
        }
        if !self.max_tasks_per_worker.is_power_of_two() {
            return Err(ConfigError::TaskCapacityNotPowerOfTwo(self.max_tasks_per_worker));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    /// One worker per CPU, [`DEFAULT_MAX_TASKS_PER_WORKER`] tasks per arena.
    fn default() -> Self {
        Self::new(0, DEFAULT_MAX_TASKS_PER_WORKER)
    }
}
