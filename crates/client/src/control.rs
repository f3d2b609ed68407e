//! Control socket client
//!
//! Sends whitelist commands to a running `usbwalld` and waits for the
//! matching response. One connection may carry any number of requests.

use anyhow::{Context, Result, anyhow};
use protocol::{
    ControlCommand, ControlError, ControlReply, ControlRequest, DeviceIdentity, Message,
    MessagePayload, read_framed_async, validate_version, write_framed_async,
};
use std::path::Path;
use std::time::Duration;
use tokio::net::UnixStream;
use tracing::debug;

/// Default time to wait for a response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection to the daemon's control socket
pub struct ControlClient {
    stream: UnixStream,
    timeout: Duration,
}

impl ControlClient {
    /// Connect to the control socket at `path`
    ///
    /// # Example
    /// ```no_run
    /// use client::ControlClient;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let mut client = ControlClient::connect("/run/usbwall/control.sock").await?;
    ///     for entry in client.list().await? {
    ///         println!("{}", entry);
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .with_context(|| format!("Failed to connect to control socket {:?}", path))?;
        debug!("Connected to {:?}", path);

        Ok(Self {
            stream,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a raw request and wait for its outcome
    ///
    /// The outer error covers transport failures; the inner one is the
    /// daemon's verdict on the command itself.
    pub async fn request(
        &mut self,
        request: ControlRequest,
    ) -> Result<std::result::Result<ControlReply, ControlError>> {
        let message = Message::new(MessagePayload::Request(request));
        write_framed_async(&mut self.stream, &message)
            .await
            .context("Failed to send request")?;

        let response = tokio::time::timeout(self.timeout, read_framed_async(&mut self.stream))
            .await
            .map_err(|_| anyhow!("No response within {:?}", self.timeout))?
            .context("Failed to read response")?
            .ok_or_else(|| anyhow!("Daemon closed the connection"))?;

        validate_version(&response.version)?;

        match response.payload {
            MessagePayload::Response { result } => Ok(result),
            MessagePayload::Error { message } => Err(anyhow!("Daemon error: {}", message)),
            MessagePayload::Request(_) => Err(anyhow!("Unexpected request from daemon")),
        }
    }

    /// Send a typed command
    pub async fn send(&mut self, command: ControlCommand) -> Result<ControlReply> {
        Ok(self.request(command.to_request()).await??)
    }

    /// Whitelist an identity; `false` if it was already whitelisted
    pub async fn allow(&mut self, identity: DeviceIdentity) -> Result<bool> {
        match self.send(ControlCommand::SetEntry(identity)).await? {
            ControlReply::Applied { changed } => Ok(changed),
            other => Err(anyhow!("Unexpected reply: {:?}", other)),
        }
    }

    /// Remove an identity; `false` if it was not whitelisted
    pub async fn revoke(&mut self, identity: DeviceIdentity) -> Result<bool> {
        match self.send(ControlCommand::RemoveEntry(identity)).await? {
            ControlReply::Applied { changed } => Ok(changed),
            other => Err(anyhow!("Unexpected reply: {:?}", other)),
        }
    }

    /// Current whitelist in insertion order
    pub async fn list(&mut self) -> Result<Vec<DeviceIdentity>> {
        match self.send(ControlCommand::ListEntries).await? {
            ControlReply::Entries { entries } => Ok(entries),
            other => Err(anyhow!("Unexpected reply: {:?}", other)),
        }
    }
}

/// Parse a hex byte string such as `09 30 65 44` or `09306544`
pub fn parse_hex_bytes(input: &str) -> Result<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);

    if digits.len() % 2 != 0 {
        return Err(anyhow!("Odd number of hex digits in '{}'", input));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| anyhow!("Invalid hex byte at offset {} in '{}'", i, input))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(parse_hex_bytes("").unwrap(), Vec::<u8>::new());
        assert_eq!(parse_hex_bytes("0930").unwrap(), vec![0x09, 0x30]);
        assert_eq!(parse_hex_bytes("0x09 30:ff").unwrap(), vec![0x09, 0x30, 0xff]);
        assert!(parse_hex_bytes("093").is_err());
        assert!(parse_hex_bytes("zz").is_err());
        assert!(parse_hex_bytes("é1").is_err());
    }

    proptest! {
        #[test]
        fn hex_formatting_parses_back(bytes in proptest::collection::vec(any::<u8>(), 0..48)) {
            let text: String = bytes.iter().map(|b| format!("{:02x} ", b)).collect();
            prop_assert_eq!(parse_hex_bytes(&text).unwrap(), bytes);
        }
    }
}
