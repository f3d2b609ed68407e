//! Logging setup and configuration

use crate::trace::{self, TRACE_TARGET, TraceLevel};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Setup tracing subscriber for the application
///
/// `default_level` applies when `RUST_LOG` is unset. Diagnostic trace lines
/// are always let through at the verbosity `trace_level` asks for, and the
/// process-wide trace threshold is set to it.
pub fn setup_logging(default_level: &str, trace_level: TraceLevel) -> crate::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| crate::Error::Logging(format!("Invalid log filter: {}", e)))?;

    let directive = format!("{}={}", TRACE_TARGET, trace_level.subscriber_level());
    let filter = filter.add_directive(
        directive
            .parse()
            .map_err(|e| crate::Error::Logging(format!("Invalid trace directive: {}", e)))?,
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .map_err(|e| crate::Error::Logging(format!("Logging already initialized: {}", e)))?;

    trace::set_trace_level(trace_level);
    Ok(())
}
