//! Hot-plug callback
//!
//! libusb forbids synchronous device I/O inside hot-plug callbacks, so the
//! callback only queues a notice. The worker loop drains the queue after
//! each `handle_events` pass and does the descriptor reads there.

use rusb::{Context, Device, Hotplug};
use std::sync::mpsc::Sender;
use tracing::debug;

/// Raw hot-plug notification queued for the worker loop
#[derive(Debug)]
pub enum HotplugNotice {
    Arrived(Device<Context>),
    Left { bus_number: u8, device_address: u8 },
}

pub struct HotplugCallback {
    notices: Sender<HotplugNotice>,
}

impl HotplugCallback {
    pub fn new(notices: Sender<HotplugNotice>) -> Self {
        Self { notices }
    }
}

impl Hotplug<Context> for HotplugCallback {
    fn device_arrived(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug: device arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        let _ = self.notices.send(HotplugNotice::Arrived(device));
    }

    fn device_left(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        let _ = self.notices.send(HotplugNotice::Left {
            bus_number: device.bus_number(),
            device_address: device.address(),
        });
    }
}
