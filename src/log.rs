//! Collector logging.
//!
//! Leveled diagnostics written to stderr. The collector logs nothing by
//! default; raising the level to `Debug` emits per-cycle summaries, and
//! `Trace` additionally reports every pointer sighting and every sweep.
//!
//! The level is set programmatically via [`set_level`] (usually through
//! [`GcConfig`](crate::GcConfig)) or from the `MARKSWEEP_LOG` environment
//! variable when a configuration is loaded with `GcConfig::from_env`.
//!
//! Formatting is only performed once the level check has passed, so a
//! disabled level costs a single atomic load on the hot scan path.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};

/// Verbosity of collector diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum LogLevel {
    /// No output at all (default).
    #[default]
    Off = 0,
    /// Unexpected but non-fatal conditions.
    Error = 1,
    /// Degraded behavior, such as an unavailable platform probe.
    Warn = 2,
    /// Lifecycle events: collector creation and teardown.
    Info = 3,
    /// Per-cycle summaries: root regions walked, records swept.
    Debug = 4,
    /// Pointer-level tracing: every mark hit and every sweep.
    Trace = 5,
}

impl LogLevel {
    /// Parse a level from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// The level name used in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current verbosity ceiling.
static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Off as u8);

/// Set the verbosity ceiling.
pub fn set_level(level: LogLevel) {
    LEVEL.store(level as u8, Ordering::Relaxed);
}

/// The current verbosity ceiling.
pub fn level() -> LogLevel {
    match LEVEL.load(Ordering::Relaxed) {
        1 => LogLevel::Error,
        2 => LogLevel::Warn,
        3 => LogLevel::Info,
        4 => LogLevel::Debug,
        5 => LogLevel::Trace,
        _ => LogLevel::Off,
    }
}

/// Whether a message at `level` would be written.
pub fn enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level as u8 <= LEVEL.load(Ordering::Relaxed)
}

/// Write one formatted line to stderr. Callers check [`enabled`] first.
pub(crate) fn write(level: LogLevel, target: &str, args: fmt::Arguments<'_>) {
    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "[{:<5}] {}: {}", level.as_str(), target, args);
}

macro_rules! warn_log {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Warn) {
            $crate::log::write(
                $crate::log::LogLevel::Warn,
                module_path!(),
                format_args!($($arg)*),
            );
        }
    };
}

macro_rules! info_log {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Info) {
            $crate::log::write(
                $crate::log::LogLevel::Info,
                module_path!(),
                format_args!($($arg)*),
            );
        }
    };
}

macro_rules! debug_log {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Debug) {
            $crate::log::write(
                $crate::log::LogLevel::Debug,
                module_path!(),
                format_args!($($arg)*),
            );
        }
    };
}

macro_rules! trace_log {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Trace) {
            $crate::log::write(
                $crate::log::LogLevel::Trace,
                module_path!(),
                format_args!($($arg)*),
            );
        }
    };
}

pub(crate) use debug_log;
pub(crate) use info_log;
pub(crate) use trace_log;
pub(crate) use warn_log;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(LogLevel::Off < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn parse_accepts_names_and_digits() {
        assert_eq!(LogLevel::parse("off"), Some(LogLevel::Off));
        assert_eq!(LogLevel::parse("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("5"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn enabled_respects_ceiling() {
        let original = level();
        set_level(LogLevel::Debug);
        assert!(enabled(LogLevel::Error));
        assert!(enabled(LogLevel::Debug));
        assert!(!enabled(LogLevel::Trace));
        assert!(!enabled(LogLevel::Off));
        set_level(original);
    }
}
