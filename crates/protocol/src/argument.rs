//! Binary encoding of a device identity as a control-command argument
//!
//! Whitelist-mutating commands carry the identity they act on as an opaque
//! byte argument:
//!
//! ```text
//! [vendor_id: u16 BE][product_id: u16 BE][serial_len: u8][serial bytes][crc32: u32 BE]
//! ```
//!
//! The CRC32 covers every byte before it. Anything that does not decode to a
//! well-formed identity is rejected as a whole; there is no partial decode.

use crate::types::{DeviceIdentity, MAX_SERIAL_LEN};
use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use crc32fast::Hasher;
use std::io::{Cursor, Read};
use thiserror::Error;

/// Fixed overhead of an encoded identity (everything except the serial)
pub const MIN_ARGUMENT_LEN: usize = 2 + 2 + 1 + 4;

/// Largest valid encoded identity
pub const MAX_ARGUMENT_LEN: usize = MIN_ARGUMENT_LEN + MAX_SERIAL_LEN;

/// Reasons an identity argument fails to decode
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("argument truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("{extra} unexpected trailing bytes")]
    TrailingBytes { extra: usize },

    #[error("serial length {len} exceeds {max} bytes")]
    SerialTooLong { len: usize, max: usize },

    #[error("serial number is not valid UTF-8")]
    SerialNotUtf8,

    #[error("serial number contains a NUL byte")]
    EmbeddedNul,

    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
}

/// Compute the CRC32 used to seal an encoded identity
#[inline]
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Encode an identity into its argument form
pub fn encode_identity(identity: &DeviceIdentity) -> Vec<u8> {
    let serial = identity.serial_number().as_bytes();
    let body_len = 5 + serial.len();

    let mut buf = vec![0u8; body_len + 4];
    BigEndian::write_u16(&mut buf[0..2], identity.vendor_id());
    BigEndian::write_u16(&mut buf[2..4], identity.product_id());
    // SerialNumber guarantees at most MAX_SERIAL_LEN bytes
    buf[4] = serial.len() as u8;
    buf[5..body_len].copy_from_slice(serial);

    let checksum = compute_checksum(&buf[..body_len]);
    BigEndian::write_u32(&mut buf[body_len..], checksum);
    buf
}

/// Decode an identity argument, rejecting anything malformed
pub fn decode_identity(bytes: &[u8]) -> Result<DeviceIdentity, ArgumentError> {
    let truncated = |needed: usize| ArgumentError::Truncated {
        needed,
        actual: bytes.len(),
    };

    if bytes.len() < MIN_ARGUMENT_LEN {
        return Err(truncated(MIN_ARGUMENT_LEN));
    }

    let mut cursor = Cursor::new(bytes);
    let vendor_id = cursor
        .read_u16::<BigEndian>()
        .map_err(|_| truncated(MIN_ARGUMENT_LEN))?;
    let product_id = cursor
        .read_u16::<BigEndian>()
        .map_err(|_| truncated(MIN_ARGUMENT_LEN))?;
    let serial_len = cursor.read_u8().map_err(|_| truncated(MIN_ARGUMENT_LEN))? as usize;

    if serial_len > MAX_SERIAL_LEN {
        return Err(ArgumentError::SerialTooLong {
            len: serial_len,
            max: MAX_SERIAL_LEN,
        });
    }

    let expected_len = MIN_ARGUMENT_LEN + serial_len;
    if bytes.len() < expected_len {
        return Err(truncated(expected_len));
    }
    if bytes.len() > expected_len {
        return Err(ArgumentError::TrailingBytes {
            extra: bytes.len() - expected_len,
        });
    }

    let mut serial = vec![0u8; serial_len];
    cursor
        .read_exact(&mut serial)
        .map_err(|_| truncated(expected_len))?;
    let expected = cursor
        .read_u32::<BigEndian>()
        .map_err(|_| truncated(expected_len))?;

    let computed = compute_checksum(&bytes[..expected_len - 4]);
    if computed != expected {
        return Err(ArgumentError::ChecksumMismatch { expected, computed });
    }

    if serial.contains(&0) {
        return Err(ArgumentError::EmbeddedNul);
    }
    let serial = String::from_utf8(serial).map_err(|_| ArgumentError::SerialNotUtf8)?;

    Ok(DeviceIdentity::new(vendor_id, product_id, serial))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an argument by hand with a correct checksum
    fn seal(body: &[u8]) -> Vec<u8> {
        let mut buf = body.to_vec();
        buf.extend_from_slice(&compute_checksum(body).to_be_bytes());
        buf
    }

    #[test]
    fn test_encoded_layout() {
        let identity = DeviceIdentity::new(0x0930, 0x6544, "AB");
        let encoded = encode_identity(&identity);

        assert_eq!(encoded.len(), MIN_ARGUMENT_LEN + 2);
        assert_eq!(&encoded[..7], &[0x09, 0x30, 0x65, 0x44, 2, b'A', b'B']);
        assert_eq!(
            BigEndian::read_u32(&encoded[7..]),
            compute_checksum(&encoded[..7])
        );
    }

    #[test]
    fn test_decode_empty_serial() {
        let arg = seal(&[0x12, 0x34, 0x56, 0x78, 0]);
        let identity = decode_identity(&arg).unwrap();
        assert_eq!(identity, DeviceIdentity::new(0x1234, 0x5678, ""));
    }

    #[test]
    fn test_decode_rejects_short_input() {
        assert_eq!(
            decode_identity(&[]),
            Err(ArgumentError::Truncated {
                needed: MIN_ARGUMENT_LEN,
                actual: 0
            })
        );

        // Header claims 4 serial bytes but only 2 follow
        let arg = seal(&[0x12, 0x34, 0x56, 0x78, 4, b'A', b'B']);
        assert!(matches!(
            decode_identity(&arg),
            Err(ArgumentError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut arg = encode_identity(&DeviceIdentity::new(1, 2, "X"));
        arg.push(0xff);
        assert_eq!(
            decode_identity(&arg),
            Err(ArgumentError::TrailingBytes { extra: 1 })
        );
    }

    #[test]
    fn test_longest_serial_fits() {
        let identity = DeviceIdentity::new(1, 2, "S".repeat(MAX_SERIAL_LEN));
        let encoded = encode_identity(&identity);
        assert_eq!(encoded.len(), MAX_ARGUMENT_LEN);
        assert_eq!(decode_identity(&encoded), Ok(identity));
    }

    #[test]
    fn test_decode_rejects_long_serial() {
        let mut body = vec![0x12, 0x34, 0x56, 0x78, 32];
        body.extend(std::iter::repeat_n(b'S', 32));
        assert_eq!(
            decode_identity(&seal(&body)),
            Err(ArgumentError::SerialTooLong { len: 32, max: 31 })
        );
    }

    #[test]
    fn test_decode_rejects_embedded_nul() {
        let arg = seal(&[0x12, 0x34, 0x56, 0x78, 3, b'A', 0, b'B']);
        assert_eq!(decode_identity(&arg), Err(ArgumentError::EmbeddedNul));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let arg = seal(&[0x12, 0x34, 0x56, 0x78, 2, 0xc3, 0x28]);
        assert_eq!(decode_identity(&arg), Err(ArgumentError::SerialNotUtf8));
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let mut arg = encode_identity(&DeviceIdentity::new(0x0930, 0x6544, "001D92DC"));
        arg[1] ^= 0x01;
        assert!(matches!(
            decode_identity(&arg),
            Err(ArgumentError::ChecksumMismatch { .. })
        ));
    }
}
