//! USB worker thread
//!
//! Dedicated thread that owns the libusb context. It runs the
//! `handle_events` loop, turns hot-plug notices into [`UsbEvent`]s for the
//! async runtime and answers [`UsbCommand`]s.

use crate::usb::device::observe;
use crate::usb::monitor::{HotplugCallback, HotplugNotice};
use common::{ObservedDevice, UsbCommand, UsbEvent, UsbWorker};
use rusb::{Context, HotplugBuilder, Registration, UsbContext};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const EVENT_TIMEOUT: Duration = Duration::from_millis(100);

pub struct UsbWorkerThread {
    context: Context,
    worker: UsbWorker,
    notices: Receiver<HotplugNotice>,
    /// Mass-storage devices reported as arrived, by (bus, address)
    tracked: HashMap<(u8, u8), ObservedDevice>,
    _registration: Option<Registration<Context>>,
}

impl UsbWorkerThread {
    /// Create the libusb context and, if asked, register for hot-plug
    ///
    /// Registration enumerates devices already on the bus, so those are
    /// decided on as if they had just arrived.
    pub fn new(worker: UsbWorker, hotplug: bool) -> Result<Self, rusb::Error> {
        let context = Context::new()?;
        let (notice_tx, notices) = mpsc::channel();

        let registration = if !hotplug {
            info!("Hot-plug monitoring disabled");
            None
        } else if !rusb::has_hotplug() {
            warn!("libusb has no hot-plug support on this platform");
            None
        } else {
            let registration = HotplugBuilder::new()
                .enumerate(true)
                .register(&context, Box::new(HotplugCallback::new(notice_tx)))?;
            debug!("Hot-plug callbacks registered");
            Some(registration)
        };

        Ok(Self {
            context,
            worker,
            notices,
            tracked: HashMap::new(),
            _registration: registration,
        })
    }

    /// Run until a Shutdown command arrives or the runtime goes away
    pub fn run(mut self) -> Result<(), rusb::Error> {
        info!("USB worker thread started");

        loop {
            match self.worker.try_recv_command() {
                Some(UsbCommand::Shutdown) => {
                    info!("USB worker shutting down");
                    break;
                }
                Some(UsbCommand::ListStorageDevices { response }) => {
                    let _ = response.send(self.list_storage_devices());
                }
                None => {}
            }

            match self.context.handle_events(Some(EVENT_TIMEOUT)) {
                Ok(()) => {}
                Err(rusb::Error::Interrupted) => {
                    debug!("USB event handling interrupted");
                }
                Err(e) => {
                    warn!("Error handling USB events: {}", e);
                    std::thread::sleep(EVENT_TIMEOUT);
                }
            }

            if !self.drain_notices() {
                info!("Event receiver closed, USB worker exiting");
                break;
            }
        }

        info!("USB worker thread stopped");
        Ok(())
    }

    /// Forward queued hot-plug notices; `false` once nobody is listening
    fn drain_notices(&mut self) -> bool {
        while let Ok(notice) = self.notices.try_recv() {
            let event = match notice {
                HotplugNotice::Arrived(device) => {
                    let Some(observed) = observe(&device) else {
                        continue;
                    };
                    self.tracked.insert(
                        (observed.bus_number, observed.device_address),
                        observed.clone(),
                    );
                    UsbEvent::DeviceArrived { device: observed }
                }
                HotplugNotice::Left {
                    bus_number,
                    device_address,
                } => {
                    if self.tracked.remove(&(bus_number, device_address)).is_none() {
                        continue;
                    }
                    UsbEvent::DeviceLeft {
                        bus_number,
                        device_address,
                    }
                }
            };

            if let Err(e) = self.worker.send_event(event) {
                error!("Failed to send USB event: {}", e);
                return false;
            }
        }
        true
    }

    fn list_storage_devices(&self) -> Vec<ObservedDevice> {
        match self.context.devices() {
            Ok(devices) => devices.iter().filter_map(|d| observe(&d)).collect(),
            Err(e) => {
                warn!("Failed to enumerate USB devices: {}", e);
                Vec::new()
            }
        }
    }
}

/// Spawn the USB worker thread
pub fn spawn_usb_worker(
    worker: UsbWorker,
    hotplug: bool,
) -> std::io::Result<std::thread::JoinHandle<Result<(), rusb::Error>>> {
    std::thread::Builder::new()
        .name("usb-worker".to_string())
        .spawn(move || UsbWorkerThread::new(worker, hotplug)?.run())
}
