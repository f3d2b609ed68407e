//! Device identity and verdict types
//!
//! A [`DeviceIdentity`] is the (vendor, product, serial) tuple that names a
//! USB storage device for whitelist purposes. Identities compare exactly on
//! all three fields; there is no wildcard or partial matching anywhere.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of bytes kept from a device serial string
///
/// Matches a 32-byte descriptor buffer with one byte reserved for the
/// terminator.
pub const MAX_SERIAL_LEN: usize = 31;

/// Device serial number as reported by the string descriptor
///
/// Construction never fails: the input is cut at the first NUL and then
/// truncated to [`MAX_SERIAL_LEN`] bytes on a character boundary. An empty
/// serial is valid and only ever equals another empty serial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SerialNumber(String);

impl SerialNumber {
    /// Build a serial number, truncating instead of rejecting
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref();
        let raw = raw.split('\0').next().unwrap_or_default();

        let mut end = raw.len().min(MAX_SERIAL_LEN);
        while !raw.is_char_boundary(end) {
            end -= 1;
        }

        Self(raw[..end].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<String> for SerialNumber {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SerialNumber {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<SerialNumber> for String {
    fn from(value: SerialNumber) -> Self {
        value.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a USB storage device for policy purposes
///
/// Immutable once built. Equality and hashing cover all three fields, so a
/// device whose serial differs by a single byte is a different device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// USB Vendor ID
    vendor_id: u16,
    /// USB Product ID
    product_id: u16,
    /// Serial string (possibly empty)
    serial_number: SerialNumber,
}

impl DeviceIdentity {
    /// Create an identity from raw descriptor values
    pub fn new(vendor_id: u16, product_id: u16, serial_number: impl Into<SerialNumber>) -> Self {
        Self {
            vendor_id,
            product_id,
            serial_number: serial_number.into(),
        }
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    pub fn serial_number(&self) -> &SerialNumber {
        &self.serial_number
    }
}

/// Formats as `vvvv:pppp` or `vvvv:pppp:SERIAL`
impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)?;
        if !self.serial_number.is_empty() {
            write!(f, ":{}", self.serial_number)?;
        }
        Ok(())
    }
}

/// Parses `VID:PID[:SERIAL]` with hexadecimal VID/PID (optional `0x` prefix)
///
/// The serial is everything after the second colon, taken byte for byte, so
/// serials containing colons or padding spaces survive. Whitespace around the
/// VID and PID is ignored. A serial longer than [`MAX_SERIAL_LEN`] is rejected here
/// rather than silently truncated, because this form is typed by an operator.
impl FromStr for DeviceIdentity {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');

        let vendor_id = parse_hex_id(parts.next(), "vendor ID", s)?;
        let product_id = parse_hex_id(parts.next(), "product ID", s)?;
        let serial = parts.next().unwrap_or_default();

        if serial.len() > MAX_SERIAL_LEN {
            return Err(ProtocolError::InvalidIdentity(format!(
                "serial number '{}' exceeds {} bytes",
                serial, MAX_SERIAL_LEN
            )));
        }
        if serial.contains('\0') {
            return Err(ProtocolError::InvalidIdentity(
                "serial number contains a NUL character".to_string(),
            ));
        }

        Ok(Self::new(vendor_id, product_id, serial))
    }
}

fn parse_hex_id(part: Option<&str>, name: &str, input: &str) -> Result<u16, ProtocolError> {
    let part = part
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            ProtocolError::InvalidIdentity(format!(
                "missing {} in '{}', expected VID:PID[:SERIAL]",
                name, input
            ))
        })?;

    let hex = part
        .strip_prefix("0x")
        .or_else(|| part.strip_prefix("0X"))
        .unwrap_or(part);

    if hex.is_empty() || hex.len() > 4 {
        return Err(ProtocolError::InvalidIdentity(format!(
            "invalid {} '{}', expected 1-4 hex digits",
            name, part
        )));
    }

    u16::from_str_radix(hex, 16).map_err(|_| {
        ProtocolError::InvalidIdentity(format!("invalid {} '{}', not a hex number", name, part))
    })
}

/// Outcome of evaluating one attach event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Device is whitelisted and may operate
    Allow,
    /// Device is not provably whitelisted and must be blocked
    Deny,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allow => f.write_str("allow"),
            Verdict::Deny => f.write_str("deny"),
        }
    }
}
