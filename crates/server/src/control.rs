//! Control channel
//!
//! Applies whitelist commands from a trusted caller. The channel performs no
//! authentication of its own; whoever can reach the transport is trusted.
//! Every command either applies fully or leaves the store untouched.

use crate::audit::{SharedAuditLogger, disabled_audit_logger};
use crate::whitelist::SharedWhitelist;
use common::{TraceLevel, diag_trace};
use protocol::{ControlCommand, ControlError, ControlReply, ControlRequest};

/// Command dispatcher bound to one whitelist store
#[derive(Clone)]
pub struct ControlChannel {
    whitelist: SharedWhitelist,
    audit_logger: SharedAuditLogger,
}

impl ControlChannel {
    pub fn new(whitelist: SharedWhitelist) -> Self {
        Self {
            whitelist,
            audit_logger: disabled_audit_logger(),
        }
    }

    pub fn with_audit_logger(mut self, audit_logger: SharedAuditLogger) -> Self {
        self.audit_logger = audit_logger;
        self
    }

    /// A caller opened the channel
    pub fn open(&self) {
        diag_trace!(TraceLevel::Debug, "control channel opened");
    }

    /// A caller closed the channel
    pub fn close(&self) {
        diag_trace!(TraceLevel::Debug, "control channel closed");
    }

    /// Decode and apply a raw request
    pub fn handle(&self, request: &ControlRequest) -> Result<ControlReply, ControlError> {
        let command = match ControlCommand::from_request(request) {
            Ok(command) => command,
            Err(e) => {
                diag_trace!(
                    TraceLevel::Warning,
                    "rejected command {:#x}: {}",
                    request.command,
                    e
                );
                if let Some(ref logger) = *self.audit_logger {
                    logger.log_command_rejected(request.command, &e.to_string());
                }
                return Err(e);
            }
        };

        Ok(self.execute(command))
    }

    /// Apply an already decoded command
    pub fn execute(&self, command: ControlCommand) -> ControlReply {
        match command {
            ControlCommand::SetEntry(identity) => {
                let changed = self.whitelist.insert(identity.clone());
                if changed && let Some(ref logger) = *self.audit_logger {
                    logger.log_entry_added(&identity);
                }
                ControlReply::Applied { changed }
            }
            ControlCommand::RemoveEntry(identity) => {
                let changed = self.whitelist.remove(&identity);
                if changed && let Some(ref logger) = *self.audit_logger {
                    logger.log_entry_removed(&identity);
                }
                ControlReply::Applied { changed }
            }
            ControlCommand::ListEntries => {
                let entries = self.whitelist.snapshot();
                diag_trace!(TraceLevel::Debug, "listing {} entries", entries.len());
                ControlReply::Entries { entries }
            }
        }
    }
}
