//! Diagnostic trace stream
//!
//! Every component reports through one leveled stream. Each emitted line gets
//! the next value of a process-wide counter, the `usbwall:` prefix and the
//! source location of the call, e.g.
//!
//! ```text
//! usbwall: 00000042 : server::policy:88 : deny 0930:6545:001D92DC4AF0C95163A2092C
//! ```
//!
//! Levels are numbered `NONE=0 .. DEBUG=5`; a line is emitted when the
//! configured threshold is numerically greater than or equal to the requested
//! level, so raising the threshold widens verbosity. `NONE` as a threshold
//! silences the stream entirely.
//!
//! Emitted lines are forwarded to `tracing` under the [`TRACE_TARGET`] target.
//! Tracing never blocks the caller and never reports failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

/// Fixed prefix identifying the subsystem on every line
pub const TRACE_PREFIX: &str = "usbwall:";

/// `tracing` target used for diagnostic lines
pub const TRACE_TARGET: &str = "usbwall";

/// Diagnostic verbosity
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    None = 0,
    Error = 1,
    Warning = 2,
    #[default]
    Info = 3,
    Notice = 4,
    Debug = 5,
}

impl TraceLevel {
    pub const ALL: [TraceLevel; 6] = [
        TraceLevel::None,
        TraceLevel::Error,
        TraceLevel::Warning,
        TraceLevel::Info,
        TraceLevel::Notice,
        TraceLevel::Debug,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            TraceLevel::None => "none",
            TraceLevel::Error => "error",
            TraceLevel::Warning => "warning",
            TraceLevel::Info => "info",
            TraceLevel::Notice => "notice",
            TraceLevel::Debug => "debug",
        }
    }

    /// Subscriber filter level that lets lines of this threshold through
    pub fn subscriber_level(self) -> &'static str {
        match self {
            TraceLevel::None | TraceLevel::Error => "error",
            TraceLevel::Warning => "warn",
            TraceLevel::Info | TraceLevel::Notice => "info",
            TraceLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts level names (case-insensitive, `warn` as an alias) or `0`-`5`
impl FromStr for TraceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return Self::from_u8(n).ok_or_else(|| format!("Trace level {} out of range 0-5", n));
        }

        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(TraceLevel::None),
            "error" => Ok(TraceLevel::Error),
            "warning" | "warn" => Ok(TraceLevel::Warning),
            "info" => Ok(TraceLevel::Info),
            "notice" => Ok(TraceLevel::Notice),
            "debug" => Ok(TraceLevel::Debug),
            other => Err(format!(
                "Invalid trace level '{}', must be one of: none, error, warning, info, notice, debug",
                other
            )),
        }
    }
}

/// Threshold plus line counter
///
/// The process uses the instance returned by [`global`]; separate instances
/// exist so the filtering and numbering rules can be exercised in isolation.
#[derive(Debug)]
pub struct Tracer {
    threshold: AtomicU8,
    counter: AtomicU32,
}

impl Tracer {
    pub const fn new(threshold: TraceLevel) -> Self {
        Self {
            threshold: AtomicU8::new(threshold as u8),
            counter: AtomicU32::new(0),
        }
    }

    pub fn threshold(&self) -> TraceLevel {
        TraceLevel::from_u8(self.threshold.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub fn set_threshold(&self, level: TraceLevel) {
        self.threshold.store(level as u8, Ordering::Relaxed);
    }

    /// Whether a line at `level` would be emitted
    ///
    /// A `None`-level line passes every threshold.
    pub fn enabled(&self, level: TraceLevel) -> bool {
        self.threshold.load(Ordering::Relaxed) >= level as u8
    }

    /// Emit one line, returning the counter value stamped on it
    ///
    /// Returns `None` when the line is filtered out; filtered calls do not
    /// consume a counter value.
    pub fn emit(
        &self,
        level: TraceLevel,
        location: &str,
        message: fmt::Arguments<'_>,
    ) -> Option<u32> {
        if !self.enabled(level) {
            return None;
        }

        // fetch_add wraps on overflow
        let line = self.counter.fetch_add(1, Ordering::Relaxed);

        match level {
            TraceLevel::None | TraceLevel::Error => tracing::error!(
                target: "usbwall",
                "{} {:08} : {} : {}",
                TRACE_PREFIX, line, location, message
            ),
            TraceLevel::Warning => tracing::warn!(
                target: "usbwall",
                "{} {:08} : {} : {}",
                TRACE_PREFIX, line, location, message
            ),
            TraceLevel::Info | TraceLevel::Notice => tracing::info!(
                target: "usbwall",
                "{} {:08} : {} : {}",
                TRACE_PREFIX, line, location, message
            ),
            TraceLevel::Debug => tracing::debug!(
                target: "usbwall",
                "{} {:08} : {} : {}",
                TRACE_PREFIX, line, location, message
            ),
        }

        Some(line)
    }
}

static GLOBAL: Tracer = Tracer::new(TraceLevel::Info);

/// The process-wide tracer used by [`diag_trace!`](crate::diag_trace)
pub fn global() -> &'static Tracer {
    &GLOBAL
}

/// Set the process-wide trace threshold
pub fn set_trace_level(level: TraceLevel) {
    GLOBAL.set_threshold(level);
}

/// Current process-wide trace threshold
pub fn trace_level() -> TraceLevel {
    GLOBAL.threshold()
}

/// Emit a diagnostic line through the process-wide tracer
///
/// Evaluates to `Option<u32>`: the counter value stamped on the line, or
/// `None` if the current threshold filtered it out.
///
/// ```
/// use common::{TraceLevel, diag_trace};
///
/// common::set_trace_level(TraceLevel::Debug);
/// let line = diag_trace!(TraceLevel::Notice, "whitelist has {} entries", 3);
/// assert!(line.is_some());
/// ```
#[macro_export]
macro_rules! diag_trace {
    ($level:expr, $($arg:tt)+) => {
        $crate::trace::global().emit(
            $level,
            concat!(module_path!(), ":", line!()),
            format_args!($($arg)+),
        )
    };
}
