//! Pluggable logging sink.
//!
//! The scheduler never fails its public API outright (see `error` module) —
//! instead it logs resource exhaustion, swallowed panics, and lifecycle
//! events through a [`LogSink`]. The default sink forwards to `tracing`, the
//! same crate the surrounding gateway's own services use.

use std::fmt;
use std::sync::Arc;

/// Severity of a logged event, mirroring the levels `tracing` exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A logging sink. No ordering or durability is promised across calls — it
/// is purely a diagnostic side channel.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

/// Default sink: forwards every event to `tracing`'s global subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::Trace => tracing::trace!("{message}"),
            Level::Debug => tracing::debug!("{message}"),
            Level::Info => tracing::info!("{message}"),
            Level::Warn => tracing::warn!("{message}"),
            Level::Error => tracing::error!("{message}"),
        }
    }
}

/// A sink that discards everything. Useful for tests that don't want
/// `tracing` output on the critical path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn log(&self, _level: Level, _message: &str) {}
}

pub(crate) fn default_sink() -> Arc<dyn LogSink> {
    Arc::new(TracingLogSink)
}
