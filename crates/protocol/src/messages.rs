//! Control protocol message definitions
//!
//! The control channel speaks a request/response protocol. A request is a raw
//! `{command, argument}` pair, the same shape an ioctl-style interface would
//! carry, and is parsed into a typed [`ControlCommand`] on the receiving side.
//! Unknown command codes are preserved so they can be rejected explicitly.

use crate::argument::{self, ArgumentError};
use crate::types::DeviceIdentity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol version using semantic versioning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// Current protocol version
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion {
    major: 1,
    minor: 0,
    patch: 0,
};

/// Command code: admit an identity to the whitelist
pub const CMD_SET_ENTRY: u32 = 0x01;
/// Command code: drop an identity from the whitelist
pub const CMD_REMOVE_ENTRY: u32 = 0x02;
/// Command code: list whitelist entries in insertion order
pub const CMD_LIST_ENTRIES: u32 = 0x03;

/// Top-level message envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Protocol version of this message
    pub version: ProtocolVersion,
    /// Message payload
    pub payload: MessagePayload,
}

impl Message {
    /// Wrap a payload with the current protocol version
    pub fn new(payload: MessagePayload) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload,
        }
    }
}

/// All message types exchanged over the control channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessagePayload {
    /// Command from a trusted caller
    Request(ControlRequest),

    /// Outcome of the preceding request
    Response {
        result: Result<ControlReply, ControlError>,
    },

    /// Connection-level failure (bad frame, version mismatch); the sender
    /// closes the connection after this
    Error { message: String },
}

/// Raw control request as received from the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    /// Command code
    pub command: u32,
    /// Opaque argument blob, interpreted per command
    #[serde(with = "serde_bytes")]
    pub argument: Vec<u8>,
}

impl ControlRequest {
    pub fn new(command: u32, argument: Vec<u8>) -> Self {
        Self { command, argument }
    }
}

/// Successful command outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlReply {
    /// Whitelist mutation applied; `changed` is false when the store already
    /// had (or lacked) the entry
    Applied { changed: bool },
    /// Current whitelist in insertion order
    Entries { entries: Vec<DeviceIdentity> },
}

/// Control channel error taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ControlError {
    /// Argument does not decode into what the command expects
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Command code is not recognised
    #[error("Unsupported command: {code:#x}")]
    UnsupportedCommand { code: u32 },
}

impl From<ArgumentError> for ControlError {
    fn from(err: ArgumentError) -> Self {
        ControlError::InvalidArgument {
            reason: err.to_string(),
        }
    }
}

/// Typed control command
///
/// New commands get a variant here, a code constant, and an arm in
/// [`ControlCommand::from_request`]; unknown codes fall through to
/// [`ControlError::UnsupportedCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Admit a device to the whitelist
    SetEntry(DeviceIdentity),
    /// Remove a device from the whitelist
    RemoveEntry(DeviceIdentity),
    /// Snapshot the whitelist
    ListEntries,
}

impl ControlCommand {
    /// Command code used on the wire
    pub fn code(&self) -> u32 {
        match self {
            ControlCommand::SetEntry(_) => CMD_SET_ENTRY,
            ControlCommand::RemoveEntry(_) => CMD_REMOVE_ENTRY,
            ControlCommand::ListEntries => CMD_LIST_ENTRIES,
        }
    }

    /// Encode into a raw request
    pub fn to_request(&self) -> ControlRequest {
        let argument = match self {
            ControlCommand::SetEntry(identity) | ControlCommand::RemoveEntry(identity) => {
                argument::encode_identity(identity)
            }
            ControlCommand::ListEntries => Vec::new(),
        };
        ControlRequest::new(self.code(), argument)
    }

    /// Parse a raw request, decoding its argument
    pub fn from_request(request: &ControlRequest) -> Result<Self, ControlError> {
        match request.command {
            CMD_SET_ENTRY => Ok(ControlCommand::SetEntry(argument::decode_identity(
                &request.argument,
            )?)),
            CMD_REMOVE_ENTRY => Ok(ControlCommand::RemoveEntry(argument::decode_identity(
                &request.argument,
            )?)),
            CMD_LIST_ENTRIES => {
                if request.argument.is_empty() {
                    Ok(ControlCommand::ListEntries)
                } else {
                    Err(ControlError::InvalidArgument {
                        reason: format!(
                            "list takes no argument, got {} bytes",
                            request.argument.len()
                        ),
                    })
                }
            }
            code => Err(ControlError::UnsupportedCommand { code }),
        }
    }
}
