//! Attach-event handling
//!
//! Consumes hot-plug events from the USB thread, asks the decision engine for
//! a verdict and hands it to an [`Enforcer`]. Acting on a verdict (unbinding
//! the storage driver, deauthorizing the port, ...) is the enforcer's job;
//! the bundled [`LoggingEnforcer`] only reports.

use crate::audit::SharedAuditLogger;
use crate::policy::DecisionEngine;
use common::{ObservedDevice, TraceLevel, UsbBridge, UsbEvent, diag_trace};
use protocol::Verdict;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns a verdict into an action on the device
pub trait Enforcer: Send + Sync {
    fn enforce(&self, device: &ObservedDevice, verdict: Verdict);
}

/// Reports verdicts without touching the device
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEnforcer;

impl Enforcer for LoggingEnforcer {
    fn enforce(&self, device: &ObservedDevice, verdict: Verdict) {
        match verdict {
            Verdict::Allow => info!(
                "Allowing {} on bus {:03} device {:03}",
                device.identity, device.bus_number, device.device_address
            ),
            Verdict::Deny => warn!(
                "Denying {} on bus {:03} device {:03}",
                device.identity, device.bus_number, device.device_address
            ),
        }
    }
}

/// Route one event; returns the verdict for arrivals
pub fn handle_event(
    event: UsbEvent,
    engine: &DecisionEngine,
    enforcer: &dyn Enforcer,
    audit_logger: &SharedAuditLogger,
) -> Option<Verdict> {
    match event {
        UsbEvent::DeviceArrived { device } => {
            let verdict = engine.decide(&device.identity);
            enforcer.enforce(&device, verdict);
            Some(verdict)
        }
        UsbEvent::DeviceLeft {
            bus_number,
            device_address,
        } => {
            diag_trace!(
                TraceLevel::Info,
                "device left bus {:03} device {:03}",
                bus_number,
                device_address
            );
            if let Some(ref logger) = **audit_logger {
                logger.log_device_left(bus_number, device_address);
            }
            None
        }
    }
}

/// Process events until the USB thread goes away
pub async fn run_attach_loop(
    bridge: UsbBridge,
    engine: DecisionEngine,
    enforcer: Arc<dyn Enforcer>,
    audit_logger: SharedAuditLogger,
) {
    while let Ok(event) = bridge.recv_event().await {
        handle_event(event, &engine, enforcer.as_ref(), &audit_logger);
    }
    debug!("USB event stream closed, attach loop exiting");
}
