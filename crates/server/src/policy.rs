//! Decision engine
//!
//! Turns one attach event into a verdict. A device is allowed only when its
//! full identity (vendor, product and serial) is an exact whitelist entry.
//! There is no wildcard, no partial match and no fallback, so an identity
//! that cannot match anything is denied.

use crate::audit::{SharedAuditLogger, disabled_audit_logger};
use crate::whitelist::SharedWhitelist;
use common::{TraceLevel, diag_trace};
use protocol::{DeviceIdentity, Verdict};

/// Whitelist-backed decision engine
///
/// Cheap to clone; clones share the same store and audit log.
#[derive(Clone)]
pub struct DecisionEngine {
    whitelist: SharedWhitelist,
    audit_logger: SharedAuditLogger,
}

impl DecisionEngine {
    pub fn new(whitelist: SharedWhitelist) -> Self {
        Self {
            whitelist,
            audit_logger: disabled_audit_logger(),
        }
    }

    /// Record every verdict in the given audit log
    pub fn with_audit_logger(mut self, audit_logger: SharedAuditLogger) -> Self {
        self.audit_logger = audit_logger;
        self
    }

    /// Decide whether an attaching device may be used
    ///
    /// Emits exactly one diagnostic line at INFO.
    pub fn decide(&self, identity: &DeviceIdentity) -> Verdict {
        let verdict = if self.whitelist.contains(identity) {
            Verdict::Allow
        } else {
            Verdict::Deny
        };

        diag_trace!(
            TraceLevel::Info,
            "{} vendor={:04x} product={:04x} serial=\"{}\"",
            verdict,
            identity.vendor_id(),
            identity.product_id(),
            identity.serial_number()
        );

        if let Some(ref logger) = *self.audit_logger {
            logger.log_decision(identity, verdict);
        }

        verdict
    }
}
