//! Common utilities for usbwall
//!
//! Shared between the filter service and the control client: the diagnostic
//! trace stream, logging setup, the error type, and the channel bridge that
//! carries hot-plug events from the USB thread into the async runtime.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;
pub mod trace;

pub use channel::{ObservedDevice, UsbBridge, UsbCommand, UsbEvent, UsbWorker, create_usb_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use trace::{TRACE_PREFIX, TRACE_TARGET, TraceLevel, Tracer, set_trace_level, trace_level};
