//! Control protocol and device identity model for usbwall
//!
//! This crate defines the types shared by the filter service and its control
//! clients: the [`DeviceIdentity`] that names a USB storage device, the
//! [`Verdict`] produced for an attach event, the control commands that mutate
//! the whitelist, and the postcard-based framing used on the control socket.
//!
//! # Example
//!
//! ```
//! use protocol::{ControlCommand, DeviceIdentity, Message, MessagePayload};
//! use protocol::{decode_framed, encode_framed};
//!
//! let identity = DeviceIdentity::new(0x0930, 0x6544, "001D92DC4AF0C95163A2092C");
//! let request = ControlCommand::SetEntry(identity).to_request();
//!
//! let framed = encode_framed(&Message::new(MessagePayload::Request(request))).unwrap();
//! let decoded = decode_framed(&framed).unwrap();
//! assert!(matches!(decoded.payload, MessagePayload::Request(_)));
//! ```

pub mod argument;
pub mod codec;
pub mod error;
pub mod messages;
pub mod types;

pub use argument::{ArgumentError, decode_identity, encode_identity};
pub use codec::{
    MAX_FRAME_SIZE, decode_framed, decode_message, encode_framed, encode_message, read_framed,
    validate_version, write_framed,
};

#[cfg(feature = "async")]
pub use codec::{read_framed_async, write_framed_async};
pub use error::{ProtocolError, Result};
pub use messages::{
    CMD_LIST_ENTRIES, CMD_REMOVE_ENTRY, CMD_SET_ENTRY, CURRENT_VERSION, ControlCommand,
    ControlError, ControlReply, ControlRequest, Message, MessagePayload, ProtocolVersion,
};
pub use types::{DeviceIdentity, MAX_SERIAL_LEN, SerialNumber, Verdict};
