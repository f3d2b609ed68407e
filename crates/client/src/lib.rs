//! usbwall control client
//!
//! Library side of `usbwall-ctl`: connects to the daemon's control socket
//! and edits the whitelist.

pub mod config;
pub mod control;

pub use config::ClientConfig;
pub use control::{ControlClient, DEFAULT_TIMEOUT, parse_hex_bytes};
