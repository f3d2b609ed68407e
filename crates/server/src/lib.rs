//! usbwall filter service
//!
//! Decides whether an attaching USB mass-storage device may be used. A
//! device is allowed only if its exact identity is on the whitelist; the
//! whitelist starts empty and is edited at runtime over the control socket.

pub mod audit;
pub mod config;
pub mod control;
pub mod enforce;
pub mod listener;
pub mod policy;
pub mod service;
pub mod usb;
pub mod whitelist;

pub use audit::{AuditLogger, SharedAuditLogger, create_audit_logger, disabled_audit_logger};
pub use config::ServerConfig;
pub use control::ControlChannel;
pub use enforce::{Enforcer, LoggingEnforcer, handle_event, run_attach_loop};
pub use listener::{ControlListener, serve_connection};
pub use policy::DecisionEngine;
pub use whitelist::{SharedWhitelist, WhitelistStore};
