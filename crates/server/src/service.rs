//! Systemd service integration
//!
//! Minimal sd-notify support so `usbwalld` can run as a `Type=notify` unit.
//! Every helper is a no-op when `NOTIFY_SOCKET` is unset.

use anyhow::{Context, Result};
use std::env;
use std::os::unix::net::UnixDatagram;
use tracing::debug;

/// Send one raw sd-notify state string
fn notify(state: &str) -> Result<()> {
    let Ok(socket_path) = env::var("NOTIFY_SOCKET") else {
        debug!("NOTIFY_SOCKET not set, skipping systemd notification");
        return Ok(());
    };

    let socket = UnixDatagram::unbound().context("Failed to create Unix socket")?;
    socket
        .send_to(state.as_bytes(), &socket_path)
        .with_context(|| format!("Failed to send '{}' to systemd", state))?;
    debug!("Notified systemd: {}", state);
    Ok(())
}

/// Startup finished; the control socket is accepting commands
pub fn notify_ready() -> Result<()> {
    notify("READY=1")
}

pub fn notify_stopping() -> Result<()> {
    notify("STOPPING=1")
}

/// Status line shown by `systemctl status`
pub fn notify_status(status: &str) -> Result<()> {
    notify(&format!("STATUS={}", status))
}

pub fn is_systemd() -> bool {
    env::var_os("NOTIFY_SOCKET").is_some()
}
