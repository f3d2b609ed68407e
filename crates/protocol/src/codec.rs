//! Message serialization and framing using postcard
//!
//! Messages are serialized with postcard and framed with a length prefix for
//! stream transports such as a Unix socket:
//!
//! ```text
//! [Length: u32 (big-endian)][Message bytes (postcard serialized)]
//! ```
//!
//! Control traffic is tiny; frames above [`MAX_FRAME_SIZE`] are refused before
//! any allocation.

use crate::{CURRENT_VERSION, Message, ProtocolVersion, error::ProtocolError, error::Result};
use std::io::{Read, Write};

#[cfg(feature = "async")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum allowed frame size (64 KiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Encode a message to bytes using postcard
///
/// # Example
/// ```
/// use protocol::{Message, MessagePayload, ControlCommand, encode_message};
///
/// let msg = Message::new(MessagePayload::Request(ControlCommand::ListEntries.to_request()));
/// let bytes = encode_message(&msg).unwrap();
/// assert!(!bytes.is_empty());
/// ```
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    postcard::to_allocvec(message).map_err(ProtocolError::from)
}

/// Decode a message from bytes using postcard
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    postcard::from_bytes(bytes).map_err(ProtocolError::from)
}

/// Validate protocol version compatibility
///
/// Major versions must match; minor differences are tolerated both ways.
pub fn validate_version(message_version: &ProtocolVersion) -> Result<()> {
    if message_version.major != CURRENT_VERSION.major {
        return Err(ProtocolError::IncompatibleVersion {
            major: message_version.major,
            minor: message_version.minor,
            expected_major: CURRENT_VERSION.major,
            expected_minor: CURRENT_VERSION.minor,
        });
    }
    Ok(())
}

/// Encode a message with length prefix for framing
pub fn encode_framed(message: &Message) -> Result<Vec<u8>> {
    let message_bytes = encode_message(message)?;
    let message_len = message_bytes.len();

    if message_len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: message_len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(4 + message_len);
    frame.extend_from_slice(&(message_len as u32).to_be_bytes());
    frame.extend_from_slice(&message_bytes);

    Ok(frame)
}

/// Decode a framed message
///
/// # Example
/// ```
/// use protocol::{Message, MessagePayload, ControlReply, encode_framed, decode_framed};
///
/// let msg = Message::new(MessagePayload::Response {
///     result: Ok(ControlReply::Applied { changed: true }),
/// });
/// let framed = encode_framed(&msg).unwrap();
/// let decoded = decode_framed(&framed).unwrap();
/// assert!(matches!(decoded.payload, MessagePayload::Response { result: Ok(_) }));
/// ```
pub fn decode_framed(frame: &[u8]) -> Result<Message> {
    if frame.len() < 4 {
        return Err(ProtocolError::IncompleteFrame {
            expected: 4,
            actual: frame.len(),
        });
    }

    let length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    check_frame_length(length)?;

    if frame.len() < 4 + length {
        return Err(ProtocolError::IncompleteFrame {
            expected: 4 + length,
            actual: frame.len(),
        });
    }

    decode_message(&frame[4..4 + length])
}

/// Write a framed message to a blocking writer
pub fn write_framed<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let framed = encode_framed(message)?;
    writer.write_all(&framed)?;
    Ok(())
}

/// Read a framed message from a blocking reader
///
/// # Example
/// ```
/// use protocol::{Message, MessagePayload, ControlCommand, write_framed, read_framed};
/// use std::io::Cursor;
///
/// let msg = Message::new(MessagePayload::Request(ControlCommand::ListEntries.to_request()));
/// let mut buffer = Vec::new();
/// write_framed(&mut buffer, &msg).unwrap();
///
/// let mut cursor = Cursor::new(buffer);
/// let decoded = read_framed(&mut cursor).unwrap();
/// assert!(matches!(decoded.payload, MessagePayload::Request(_)));
/// ```
pub fn read_framed<R: Read>(reader: &mut R) -> Result<Message> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let length = u32::from_be_bytes(len_bytes) as usize;
    check_frame_length(length)?;

    let mut message_bytes = vec![0u8; length];
    reader.read_exact(&mut message_bytes)?;

    decode_message(&message_bytes)
}

/// Async: write a framed message
#[cfg(feature = "async")]
pub async fn write_framed_async<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let framed = encode_framed(message)?;
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}

/// Async: read one framed message
///
/// Returns `Ok(None)` when the peer closed the stream cleanly before a new
/// frame started. A stream that ends part way through a frame, including
/// inside the length prefix, is an I/O error.
#[cfg(feature = "async")]
pub async fn read_framed_async<R>(reader: &mut R) -> Result<Option<Message>>
where
    R: AsyncReadExt + Unpin,
{
    let mut len_bytes = [0u8; 4];
    // Only an EOF before the first prefix byte is a clean close
    match reader.read_u8().await {
        Ok(first) => len_bytes[0] = first,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    reader.read_exact(&mut len_bytes[1..]).await?;
    let length = u32::from_be_bytes(len_bytes) as usize;
    check_frame_length(length)?;

    let mut message_bytes = vec![0u8; length];
    reader.read_exact(&mut message_bytes).await?;

    decode_message(&message_bytes).map(Some)
}

fn check_frame_length(length: usize) -> Result<()> {
    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}
