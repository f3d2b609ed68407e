//! usbwall filter daemon
//!
//! Watches the USB bus for mass-storage devices and allows only those whose
//! identity has been whitelisted over the control socket.

use anyhow::{Context, Result};
use clap::Parser;
use common::{TraceLevel, UsbBridge, UsbCommand, create_usb_bridge, setup_logging};
use server::config::ServerConfig;
use server::usb::spawn_usb_worker;
use server::{
    ControlChannel, ControlListener, DecisionEngine, LoggingEnforcer, SharedAuditLogger,
    WhitelistStore, create_audit_logger, run_attach_loop, service,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "usbwalld")]
#[command(
    author,
    version,
    about = "usbwall - USB mass-storage whitelist filter"
)]
#[command(long_about = "
Allows a USB mass-storage device only if its vendor ID, product ID and serial
number exactly match a whitelist entry. The whitelist starts empty and is
edited at runtime with usbwall-ctl over the control socket.

EXAMPLES:
    # Run with default config
    usbwalld

    # Run with custom config
    usbwalld --config /path/to/server.toml

    # List attached mass-storage devices and exit
    usbwalld --list-devices

    # Verbose diagnostic trace
    usbwalld --trace-level debug

CONFIGURATION:
    The daemon looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usbwall/server.toml
    3. /etc/usbwall/server.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Run as systemd service
    #[arg(long)]
    service: bool,

    /// List attached mass-storage devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Diagnostic trace threshold (none, error, warning, info, notice, debug or 0-5)
    #[arg(short, long, value_name = "LEVEL")]
    trace_level: Option<TraceLevel>,

    /// Control socket path
    #[arg(short, long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Do not watch the bus for attach events
    #[arg(long)]
    no_hotplug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = ServerConfig::default();
        let path = ServerConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        ServerConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        ServerConfig::load_or_default()
    };

    if let Some(level) = args.log_level {
        config.server.log_level = level;
    }
    if let Some(level) = args.trace_level {
        config.server.trace_level = level;
    }
    if let Some(socket) = args.socket {
        config.control.socket_path = socket;
    }
    if args.no_hotplug {
        config.usb.hotplug = false;
    }
    config.server.service_mode |= args.service;
    config.validate().context("Invalid configuration")?;

    setup_logging(&config.server.log_level, config.server.trace_level)
        .context("Failed to setup logging")?;

    info!("usbwall v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Log level: {}, trace level: {}",
        config.server.log_level, config.server.trace_level
    );

    let (usb_bridge, worker) = create_usb_bridge();
    let hotplug = config.usb.hotplug && !args.list_devices;
    let usb_worker_handle =
        spawn_usb_worker(worker, hotplug).context("Failed to spawn USB worker thread")?;

    let result = if args.list_devices {
        list_devices_mode(&usb_bridge).await
    } else {
        run(config, usb_bridge.clone()).await
    };

    info!("Shutting down USB subsystem...");
    if let Err(e) = usb_bridge.send_command(UsbCommand::Shutdown).await {
        error!("Error shutting down USB worker: {:#}", e);
    }
    match usb_worker_handle.join() {
        Ok(Err(e)) => error!("USB worker failed: {}", e),
        Err(e) => error!("USB worker thread panicked: {:?}", e),
        Ok(Ok(())) => {}
    }

    result
}

/// Print attached mass-storage devices and exit
async fn list_devices_mode(usb_bridge: &UsbBridge) -> Result<()> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    usb_bridge
        .send_command(UsbCommand::ListStorageDevices { response: tx })
        .await
        .context("Failed to send ListStorageDevices command")?;

    let devices = rx.await.context("Failed to receive device list")?;

    if devices.is_empty() {
        println!("No mass-storage devices found.");
    } else {
        println!("Found {} mass-storage device(s):\n", devices.len());
        for device in devices {
            println!(
                "  Bus {:03} Device {:03}: {}",
                device.bus_number, device.device_address, device.identity
            );
        }
    }
    Ok(())
}

/// Run the filter until Ctrl+C
async fn run(config: ServerConfig, usb_bridge: UsbBridge) -> Result<()> {
    if config.server.service_mode && service::is_systemd() {
        info!("Running under systemd");
    }

    let audit_logger: SharedAuditLogger = create_audit_logger(config.audit.expanded());
    if let Some(ref logger) = *audit_logger {
        logger.log_server_started(env!("CARGO_PKG_VERSION"));
    }

    // Owned here; dropped (after clearing) when the daemon stops
    let whitelist = WhitelistStore::shared();
    let engine = DecisionEngine::new(whitelist.clone()).with_audit_logger(audit_logger.clone());
    let channel = ControlChannel::new(whitelist.clone()).with_audit_logger(audit_logger.clone());

    let listener = ControlListener::bind(
        &config.control.expanded_socket_path(),
        config.control.socket_mode,
        channel,
    )?;

    let attach_handle = tokio::spawn(run_attach_loop(
        usb_bridge,
        engine,
        Arc::new(LoggingEnforcer),
        audit_logger.clone(),
    ));
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = listener.run().await {
            error!("Control listener error: {:#}", e);
        }
    });

    service::notify_ready().context("Failed to notify systemd ready")?;
    service::notify_status("Filtering - whitelist empty")
        .context("Failed to send status to systemd")?;
    info!("Press Ctrl+C to shutdown");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }

    service::notify_stopping().context("Failed to notify systemd stopping")?;

    // Dropping the listener task removes the socket file
    listener_handle.abort();
    let _ = listener_handle.await;
    attach_handle.abort();

    whitelist.clear();

    if let Some(ref logger) = *audit_logger {
        logger.log_server_stopped("signal");
        logger.shutdown().await;
    }

    info!("usbwall shutdown complete");
    Ok(())
}
