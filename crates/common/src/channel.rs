//! Async channel bridge between Tokio runtime and USB thread
//!
//! libusb hot-plug callbacks run on a dedicated blocking thread. Attach and
//! detach notifications travel to the runtime as [`UsbEvent`]s; the runtime
//! steers the thread with [`UsbCommand`]s.

use async_channel::{Receiver, Sender, bounded};
use protocol::DeviceIdentity;

/// A mass-storage device seen on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedDevice {
    /// Bus number
    pub bus_number: u8,
    /// Device address on the bus
    pub device_address: u8,
    /// Identity read from the device descriptor
    pub identity: DeviceIdentity,
}

/// Commands from Tokio runtime to USB thread
#[derive(Debug)]
pub enum UsbCommand {
    /// List mass-storage devices currently attached
    ListStorageDevices {
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<Vec<ObservedDevice>>,
    },

    /// Shutdown the USB thread gracefully
    Shutdown,
}

/// Hot-plug events from the USB thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbEvent {
    /// Mass-storage device attached
    DeviceArrived { device: ObservedDevice },

    /// Device detached
    DeviceLeft { bus_number: u8, device_address: u8 },
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct UsbBridge {
    cmd_tx: Sender<UsbCommand>,
    event_rx: Receiver<UsbEvent>,
}

impl UsbBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: UsbCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| crate::Error::BridgeClosed("worker"))
    }

    /// Receive an event from the USB thread
    ///
    /// Fails once the USB thread has exited and dropped its sender.
    pub async fn recv_event(&self) -> crate::Result<UsbEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|_| crate::Error::BridgeClosed("worker"))
    }
}

/// Handle for USB thread (blocking)
pub struct UsbWorker {
    pub(crate) cmd_rx: Receiver<UsbCommand>,
    /// Event sender (public so hot-plug callbacks can hold a clone)
    pub event_tx: Sender<UsbEvent>,
}

impl UsbWorker {
    /// Receive a command from Tokio runtime (blocking)
    pub fn recv_command(&self) -> crate::Result<UsbCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|_| crate::Error::BridgeClosed("runtime"))
    }

    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<UsbCommand> {
        self.cmd_rx.try_recv().ok()
    }

    /// Send an event to Tokio runtime (blocking)
    pub fn send_event(&self, event: UsbEvent) -> crate::Result<()> {
        self.event_tx
            .send_blocking(event)
            .map_err(|_| crate::Error::BridgeClosed("runtime"))
    }
}

/// Create the channel bridge between Tokio and USB thread
///
/// Returns (UsbBridge for Tokio, UsbWorker for USB thread)
pub fn create_usb_bridge() -> (UsbBridge, UsbWorker) {
    let (cmd_tx, cmd_rx) = bounded(64);
    let (event_tx, event_rx) = bounded(256);

    (
        UsbBridge { cmd_tx, event_rx },
        UsbWorker { cmd_rx, event_tx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_reaches_worker() {
        let (bridge, worker) = create_usb_bridge();

        let handle = std::thread::spawn(move || {
            let cmd = worker.recv_command().unwrap();
            matches!(cmd, UsbCommand::Shutdown)
        });

        bridge.send_command(UsbCommand::Shutdown).await.unwrap();
        assert!(handle.join().unwrap());
    }

    #[tokio::test]
    async fn test_event_reaches_runtime() {
        let (bridge, worker) = create_usb_bridge();
        let device = ObservedDevice {
            bus_number: 1,
            device_address: 4,
            identity: DeviceIdentity::new(0x0930, 0x6544, "ABC"),
        };

        let sent = device.clone();
        std::thread::spawn(move || {
            worker
                .send_event(UsbEvent::DeviceArrived { device: sent })
                .unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(
            bridge.recv_event().await.unwrap(),
            UsbEvent::DeviceArrived { device }
        );
    }

    #[tokio::test]
    async fn test_recv_fails_after_worker_drop() {
        let (bridge, worker) = create_usb_bridge();
        drop(worker);
        assert!(bridge.recv_event().await.is_err());
    }
}
