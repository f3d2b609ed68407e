//! Control socket listener
//!
//! Accepts local connections on a Unix-domain socket and runs one task per
//! connection. Each connection carries any number of request/response
//! exchanges; a frame that cannot be decoded, or one from an incompatible
//! protocol version, is answered with an error frame and the connection is
//! closed.

use crate::control::ControlChannel;
use anyhow::{Context, Result};
use protocol::{
    Message, MessagePayload, ProtocolError, read_framed_async, validate_version,
    write_framed_async,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

/// Bound control socket
pub struct ControlListener {
    listener: UnixListener,
    path: PathBuf,
    channel: ControlChannel,
}

impl ControlListener {
    /// Bind the socket at `path` and apply `mode` to it
    ///
    /// A leftover socket file from a previous run is replaced. Must be called
    /// from within a Tokio runtime.
    pub fn bind(path: &Path, mode: u32, channel: ControlChannel) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {:?}", parent))?;
        }

        if path.exists() {
            debug!("Removing stale control socket {:?}", path);
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove stale socket: {:?}", path))?;
        }

        let listener = UnixListener::bind(path)
            .with_context(|| format!("Failed to bind control socket: {:?}", path))?;

        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to set permissions on {:?}", path))?;

        info!("Control socket listening on {:?} (mode {:o})", path, mode);
        Ok(Self {
            listener,
            path: path.to_path_buf(),
            channel,
        })
    }

    /// Accept connections until the task is cancelled
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, _addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Failed to accept control connection: {}", e);
                    continue;
                }
            };

            let channel = self.channel.clone();
            tokio::spawn(async move {
                channel.open();
                if let Err(e) = serve_connection(stream, &channel).await {
                    error!("Control connection error: {:#}", e);
                }
                channel.close();
            });
        }
    }
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("Could not remove control socket {:?}: {}", self.path, e);
        }
    }
}

/// Serve requests on one connection until the peer hangs up
pub async fn serve_connection(mut stream: UnixStream, channel: &ControlChannel) -> Result<()> {
    loop {
        let message = match read_framed_async(&mut stream).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("Control client disconnected");
                return Ok(());
            }
            Err(ProtocolError::Io(e)) => {
                return Err(e).context("Failed to read control frame");
            }
            Err(e) => {
                warn!("Rejecting control frame: {}", e);
                send_error(&mut stream, e.to_string()).await;
                return Ok(());
            }
        };

        if let Err(e) = validate_version(&message.version) {
            warn!("Rejecting control client: {}", e);
            send_error(&mut stream, e.to_string()).await;
            return Ok(());
        }

        let request = match message.payload {
            MessagePayload::Request(request) => request,
            other => {
                warn!("Unexpected control payload: {:?}", other);
                send_error(&mut stream, "Expected a request".to_string()).await;
                return Ok(());
            }
        };

        let result = channel.handle(&request);
        let response = Message::new(MessagePayload::Response { result });
        write_framed_async(&mut stream, &response)
            .await
            .context("Failed to write control response")?;
    }
}

async fn send_error(stream: &mut UnixStream, message: String) {
    let frame = Message::new(MessagePayload::Error { message });
    if let Err(e) = write_framed_async(stream, &frame).await {
        debug!("Failed to send error frame: {}", e);
    }
}
