//! Trace output, gated by a process-wide level.
//!
//! The level is set once at registration time and consulted from every
//! public operation.  Messages go to stderr; there is no log framework and
//! no buffering, so trace lines interleave correctly with the host
//! database's own diagnostics.

use std::sync::atomic::{AtomicI32, Ordering};

/// Trace tiers, from quietest to noisiest.  A message tagged with a tier is
/// emitted when the configured level is at or above that tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum TraceLevel {
    /// Tracing disabled.
    None = 0,
    /// Registration banner and per-file counter reports at close.
    Registration = 1,
    /// File open and close.
    OpenClose = 2,
    /// Non-I/O file methods: lock, sync, truncate, file-control.
    NonIo = 3,
    /// Compression and decompression of chunks.
    Compression = 4,
    /// Individual reads and writes.
    Io = 5,
    /// Chunk flushes, loads, and hole punches.
    Trace = 6,
    /// Everything.
    Maximum = 7,
}

/// Tier selected when a negative level is requested.  Disabling trace
/// output takes an explicit 0; anything below that means "the caller did
/// not choose" and lands on the registration tier.
pub const DEFAULT_TRACE_LEVEL: TraceLevel = TraceLevel::Registration;

/// Process-wide trace level.  0 = silent.
pub static TRACE_LEVEL: AtomicI32 = AtomicI32::new(0);

/// Returns whether a message at `level` should currently be emitted.
#[inline]
pub fn enabled(level: TraceLevel) -> bool {
    TRACE_LEVEL.load(Ordering::Relaxed) >= level as i32
}

/// Sets the process-wide trace level.  Values above 7 store 7; negative
/// values store [`DEFAULT_TRACE_LEVEL`].  Returns the value stored.
pub fn set_level(level: i32) -> i32 {
    let stored = if level >= TraceLevel::Maximum as i32 {
        TraceLevel::Maximum as i32
    } else if level < TraceLevel::None as i32 {
        DEFAULT_TRACE_LEVEL as i32
    } else {
        level
    };
    TRACE_LEVEL.store(stored, Ordering::Relaxed);
    stored
}

/// Emit a trace line at the given [`TraceLevel`] when enabled.
macro_rules! vtrace {
    ($level:expr, $($arg:tt)*) => {
        if $crate::trace::enabled($level) {
            eprintln!($($arg)*);
        }
    };
}
pub(crate) use vtrace;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_level_clamps_high_and_defaults_negative() {
        assert_eq!(set_level(99), 7);
        // A negative level is "unset", not "off": it turns tracing on at
        // the default tier.
        assert_eq!(set_level(-3), DEFAULT_TRACE_LEVEL as i32);
        assert_eq!(set_level(4), 4);
        assert_eq!(set_level(0), 0);
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(TraceLevel::Registration < TraceLevel::OpenClose);
        assert!(TraceLevel::Io < TraceLevel::Trace);
        assert!(TraceLevel::Trace < TraceLevel::Maximum);
    }

    #[test]
    fn enabled_respects_level() {
        set_level(TraceLevel::NonIo as i32);
        assert!(enabled(TraceLevel::Registration));
        assert!(enabled(TraceLevel::NonIo));
        assert!(!enabled(TraceLevel::Io));
        set_level(0);
        assert!(!enabled(TraceLevel::Registration));
    }
}
