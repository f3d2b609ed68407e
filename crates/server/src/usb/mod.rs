//! USB subsystem
//!
//! Watches the bus for mass-storage devices. libusb work happens on a
//! dedicated thread (see [`worker`]); results reach the async runtime over
//! the `common` channel bridge.

pub mod device;
pub mod monitor;
pub mod worker;

pub use device::{MASS_STORAGE_CLASS, has_storage_class, is_mass_storage, observe, read_identity};
pub use worker::{UsbWorkerThread, spawn_usb_worker};
