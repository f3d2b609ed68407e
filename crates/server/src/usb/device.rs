//! Mass-storage detection and identity extraction
//!
//! Only devices that expose the mass-storage class, either on the device
//! descriptor or on any interface of any configuration, are reported to the
//! decision engine.

use common::ObservedDevice;
use protocol::DeviceIdentity;
use rusb::{Device, DeviceDescriptor, UsbContext};
use std::time::Duration;
use tracing::debug;

/// USB class code for mass storage
pub const MASS_STORAGE_CLASS: u8 = 0x08;

const STRING_TIMEOUT: Duration = Duration::from_millis(500);

/// Class test on already-read descriptor values
pub fn has_storage_class(
    device_class: u8,
    interface_classes: impl IntoIterator<Item = u8>,
) -> bool {
    device_class == MASS_STORAGE_CLASS
        || interface_classes
            .into_iter()
            .any(|class| class == MASS_STORAGE_CLASS)
}

fn interface_classes<T: UsbContext>(device: &Device<T>, descriptor: &DeviceDescriptor) -> Vec<u8> {
    (0..descriptor.num_configurations())
        .filter_map(|index| device.config_descriptor(index).ok())
        .flat_map(|config| {
            config
                .interfaces()
                .flat_map(|interface| interface.descriptors().map(|d| d.class_code()))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Whether the device speaks the mass-storage class
pub fn is_mass_storage<T: UsbContext>(device: &Device<T>) -> bool {
    match device.device_descriptor() {
        Ok(descriptor) => has_storage_class(
            descriptor.class_code(),
            interface_classes(device, &descriptor),
        ),
        Err(e) => {
            debug!(
                "Cannot read descriptor of bus {:03} device {:03}: {}",
                device.bus_number(),
                device.address(),
                e
            );
            false
        }
    }
}

/// Read vendor, product and serial from the device
///
/// A device whose serial string cannot be read gets the empty serial; it
/// then only matches a whitelist entry that was added without a serial.
pub fn read_identity<T: UsbContext>(device: &Device<T>) -> Result<DeviceIdentity, rusb::Error> {
    let descriptor = device.device_descriptor()?;

    let serial = match descriptor.serial_number_string_index() {
        Some(_) => device
            .open()
            .and_then(|handle| {
                let language = handle
                    .read_languages(STRING_TIMEOUT)?
                    .first()
                    .copied()
                    .ok_or(rusb::Error::NotFound)?;
                handle.read_serial_number_string(language, &descriptor, STRING_TIMEOUT)
            })
            .unwrap_or_else(|e| {
                debug!(
                    "No serial for {:04x}:{:04x}: {}",
                    descriptor.vendor_id(),
                    descriptor.product_id(),
                    e
                );
                String::new()
            }),
        None => String::new(),
    };

    Ok(DeviceIdentity::new(
        descriptor.vendor_id(),
        descriptor.product_id(),
        serial,
    ))
}

/// Identity plus bus position, for mass-storage devices only
pub fn observe<T: UsbContext>(device: &Device<T>) -> Option<ObservedDevice> {
    if !is_mass_storage(device) {
        return None;
    }

    match read_identity(device) {
        Ok(identity) => Some(ObservedDevice {
            bus_number: device.bus_number(),
            device_address: device.address(),
            identity,
        }),
        Err(e) => {
            debug!(
                "Failed to read identity of bus {:03} device {:03}: {}",
                device.bus_number(),
                device.address(),
                e
            );
            None
        }
    }
}
