//! Audit log
//!
//! Optional JSON-lines record of every verdict and every whitelist change,
//! written by a background task so the decision path never touches the
//! filesystem. Files rotate by size: `audit.log` becomes `audit.log.1`,
//! `audit.log.1` becomes `audit.log.2`, and so on up to `max_files`.

use crate::config::AuditConfig;
use anyhow::{Context, Result};
use protocol::{DeviceIdentity, Verdict};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// Kinds of audited events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A verdict was reached for an attaching device
    Decision,
    /// A device left the bus
    DeviceLeft,
    /// An identity was added to the whitelist
    EntryAdded,
    /// An identity was removed from the whitelist
    EntryRemoved,
    /// A control command was refused
    CommandRejected,
    ServerStarted,
    ServerStopped,
}

/// Outcome recorded with each event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Success,
    Failure,
    Denied,
}

/// One line of the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    pub event_type: AuditEventType,
    pub result: AuditResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AuditEntry {
    /// Create an entry stamped with the current time
    pub fn new(event_type: AuditEventType, result: AuditResult) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            timestamp_ms,
            event_type,
            result,
            vendor_id: None,
            product_id: None,
            serial_number: None,
            message: None,
        }
    }

    /// Attach the identity fields
    pub fn with_identity(mut self, identity: &DeviceIdentity) -> Self {
        self.vendor_id = Some(identity.vendor_id());
        self.product_id = Some(identity.product_id());
        self.serial_number = Some(identity.serial_number().as_str().to_string());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

enum AuditMessage {
    Log(AuditEntry),
    /// Flush and stop; the sender is signalled once the file is closed
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the background audit writer
pub struct AuditLogger {
    sender: mpsc::UnboundedSender<AuditMessage>,
}

impl AuditLogger {
    /// Start the writer task
    ///
    /// Returns `None` when auditing is disabled. Must be called from within a
    /// Tokio runtime.
    pub fn new(config: AuditConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let writer = AuditWriter::new(config);
        tokio::spawn(writer.run(receiver));

        Some(Self { sender })
    }

    /// Queue an entry
    pub fn log(&self, entry: AuditEntry) {
        if let Err(e) = self.sender.send(AuditMessage::Log(entry)) {
            warn!("Failed to send audit log entry: {}", e);
        }
    }

    /// Flush queued entries and stop the writer
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(AuditMessage::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn log_decision(&self, identity: &DeviceIdentity, verdict: Verdict) {
        let result = match verdict {
            Verdict::Allow => AuditResult::Success,
            Verdict::Deny => AuditResult::Denied,
        };
        self.log(AuditEntry::new(AuditEventType::Decision, result).with_identity(identity));
    }

    pub fn log_device_left(&self, bus_number: u8, device_address: u8) {
        self.log(
            AuditEntry::new(AuditEventType::DeviceLeft, AuditResult::Success).with_message(
                format!("bus {:03} device {:03}", bus_number, device_address),
            ),
        );
    }

    pub fn log_entry_added(&self, identity: &DeviceIdentity) {
        self.log(
            AuditEntry::new(AuditEventType::EntryAdded, AuditResult::Success)
                .with_identity(identity),
        );
    }

    pub fn log_entry_removed(&self, identity: &DeviceIdentity) {
        self.log(
            AuditEntry::new(AuditEventType::EntryRemoved, AuditResult::Success)
                .with_identity(identity),
        );
    }

    pub fn log_command_rejected(&self, command: u32, reason: &str) {
        self.log(
            AuditEntry::new(AuditEventType::CommandRejected, AuditResult::Failure)
                .with_message(format!("command {:#x}: {}", command, reason)),
        );
    }

    pub fn log_server_started(&self, version: &str) {
        self.log(
            AuditEntry::new(AuditEventType::ServerStarted, AuditResult::Success)
                .with_message(format!("version {}", version)),
        );
    }

    pub fn log_server_stopped(&self, reason: &str) {
        self.log(
            AuditEntry::new(AuditEventType::ServerStopped, AuditResult::Success)
                .with_message(reason),
        );
    }
}

/// Shared audit logger handle; `None` inside when auditing is disabled
pub type SharedAuditLogger = Arc<Option<AuditLogger>>;

/// Create a shared audit logger from configuration
pub fn create_audit_logger(config: AuditConfig) -> SharedAuditLogger {
    Arc::new(AuditLogger::new(config))
}

/// A handle that records nothing
pub fn disabled_audit_logger() -> SharedAuditLogger {
    Arc::new(None)
}

struct AuditWriter {
    config: AuditConfig,
    file: Option<BufWriter<File>>,
    current_file_size: u64,
}

impl AuditWriter {
    fn new(config: AuditConfig) -> Self {
        Self {
            config,
            file: None,
            current_file_size: 0,
        }
    }

    fn open_file(&mut self) -> Result<()> {
        let path = &self.config.path;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create audit log directory: {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open audit log: {:?}", path))?;

        self.current_file_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.file = Some(BufWriter::new(file));

        debug!("Opened audit log: {:?}", path);
        Ok(())
    }

    fn write_entry(&mut self, entry: &AuditEntry) -> Result<()> {
        if self.file.is_none() {
            self.open_file()?;
        }

        let mut line = serde_json::to_string(entry).context("Failed to serialize audit entry")?;
        line.push('\n');

        if let Some(ref mut writer) = self.file {
            writer
                .write_all(line.as_bytes())
                .context("Failed to write audit entry")?;
            writer.flush().context("Failed to flush audit log")?;
            self.current_file_size += line.len() as u64;
        }

        if self.should_rotate() {
            self.rotate()?;
        }
        Ok(())
    }

    fn should_rotate(&self) -> bool {
        self.config
            .max_size_mb
            .is_some_and(|mb| self.current_file_size >= u64::from(mb) * 1024 * 1024)
    }

    fn rotate(&mut self) -> Result<()> {
        self.file = None;

        let path = &self.config.path;
        let max_files = self.config.max_files.unwrap_or(5).max(1);

        // Oldest first so nothing is overwritten
        let oldest = rotated_path(path, max_files);
        if oldest.exists() {
            std::fs::remove_file(&oldest)
                .with_context(|| format!("Failed to remove {:?}", oldest))?;
        }
        for i in (1..max_files).rev() {
            let from = rotated_path(path, i);
            if from.exists() {
                std::fs::rename(&from, rotated_path(path, i + 1))
                    .with_context(|| format!("Failed to rotate {:?}", from))?;
            }
        }
        if path.exists() {
            std::fs::rename(path, rotated_path(path, 1))
                .with_context(|| format!("Failed to rotate {:?}", path))?;
        }

        debug!("Rotated audit log: {:?}", path);
        self.open_file()
    }

    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<AuditMessage>) {
        while let Some(message) = receiver.recv().await {
            match message {
                AuditMessage::Log(entry) => {
                    if let Err(e) = self.write_entry(&entry) {
                        error!("Failed to write audit log entry: {:#}", e);
                    }
                }
                AuditMessage::Shutdown(done) => {
                    debug!("Audit logger shutting down");
                    self.close();
                    let _ = done.send(());
                    return;
                }
            }
        }
        self.close();
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.file.take() {
            let _ = writer.flush();
        }
    }
}

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let file_name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("audit.log");
    base.with_file_name(format!("{}.{}", file_name, index))
}
