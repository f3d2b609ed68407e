//! usbwall-ctl
//!
//! Command-line client that edits the whitelist of a running usbwalld.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client::{ClientConfig, ControlClient, parse_hex_bytes};
use common::{TraceLevel, setup_logging};
use protocol::{ControlReply, ControlRequest, DeviceIdentity};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "usbwall-ctl")]
#[command(author, version, about = "Edit the usbwall whitelist at runtime")]
#[command(long_about = "
Talks to a running usbwalld over its control socket. Devices are named as
VID:PID[:SERIAL] with hexadecimal vendor and product IDs; leaving out the
serial names a device without one.

EXAMPLES:
    # Allow a pen drive
    usbwall-ctl allow 0930:6544:001D92DC4AF0C95163A2092C

    # Revoke it again
    usbwall-ctl revoke 0930:6544:001D92DC4AF0C95163A2092C

    # Show the whitelist
    usbwall-ctl list

    # Send a raw command code with a hex argument
    usbwall-ctl raw 0x1 '09 30 65 44 00 ...'

CONFIGURATION:
    The client looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usbwall/client.toml
    3. /etc/usbwall/client.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Control socket path
    #[arg(short, long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Seconds to wait for the daemon's answer
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a device to the whitelist
    Allow {
        /// Device as VID:PID[:SERIAL]
        identity: DeviceIdentity,
    },
    /// Remove a device from the whitelist
    Revoke {
        /// Device as VID:PID[:SERIAL]
        identity: DeviceIdentity,
    },
    /// Print the whitelist
    List,
    /// Send a raw command code and argument
    Raw {
        /// Command code (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_code)]
        code: u32,
        /// Argument bytes in hex
        #[arg(default_value = "")]
        argument: String,
    },
}

fn parse_code(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("Invalid command code '{}': {}", s, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = ClientConfig::default();
        let path = ClientConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        ClientConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        ClientConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.client.log_level);
    setup_logging(log_level, TraceLevel::None).context("Failed to setup logging")?;

    let Some(command) = args.command else {
        anyhow::bail!("No command given, see --help");
    };

    let socket = args.socket.unwrap_or_else(|| config.socket_path());
    debug!("Using control socket {:?}", socket);

    let mut client = ControlClient::connect(&socket)
        .await?
        .with_timeout(Duration::from_secs(args.timeout));

    match command {
        Command::Allow { identity } => {
            if client.allow(identity.clone()).await? {
                println!("Allowed {}", identity);
            } else {
                println!("{} was already allowed", identity);
            }
        }
        Command::Revoke { identity } => {
            if client.revoke(identity.clone()).await? {
                println!("Revoked {}", identity);
            } else {
                println!("{} was not on the whitelist", identity);
            }
        }
        Command::List => {
            let entries = client.list().await?;
            if entries.is_empty() {
                println!("Whitelist is empty.");
            } else {
                for entry in entries {
                    println!("{}", entry);
                }
            }
        }
        Command::Raw { code, argument } => {
            let argument = parse_hex_bytes(&argument)?;
            let result = client
                .request(ControlRequest::new(code, argument))
                .await?;
            match result {
                Ok(ControlReply::Applied { changed }) => println!("OK (changed: {})", changed),
                Ok(ControlReply::Entries { entries }) => {
                    for entry in entries {
                        println!("{}", entry);
                    }
                }
                Err(e) => anyhow::bail!("{}", e),
            }
        }
    }

    Ok(())
}
