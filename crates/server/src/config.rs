//! Server configuration management

use anyhow::{Context, Result, anyhow};
use common::TraceLevel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default control socket location
pub const DEFAULT_SOCKET_PATH: &str = "/run/usbwall/control.sock";

/// Default control socket permissions (owner and group only)
pub const DEFAULT_SOCKET_MODE: u32 = 0o660;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSettings,
    #[serde(default)]
    pub control: ControlSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Run headless under a service manager
    #[serde(default)]
    pub service_mode: bool,
    pub log_level: String,
    /// Diagnostic trace threshold
    #[serde(default)]
    pub trace_level: TraceLevel,
}

/// Control socket settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSettings {
    #[serde(default = "ControlSettings::default_socket_path")]
    pub socket_path: PathBuf,
    /// Permission bits applied to the socket file
    #[serde(default = "ControlSettings::default_socket_mode")]
    pub socket_mode: u32,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            socket_path: Self::default_socket_path(),
            socket_mode: Self::default_socket_mode(),
        }
    }
}

impl ControlSettings {
    fn default_socket_path() -> PathBuf {
        PathBuf::from(DEFAULT_SOCKET_PATH)
    }

    fn default_socket_mode() -> u32 {
        DEFAULT_SOCKET_MODE
    }

    /// Socket path with `~` and environment variables expanded
    pub fn expanded_socket_path(&self) -> PathBuf {
        expand_path(&self.socket_path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Watch the bus for mass-storage attach events
    #[serde(default = "UsbSettings::default_hotplug")]
    pub hotplug: bool,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            hotplug: Self::default_hotplug(),
        }
    }
}

impl UsbSettings {
    fn default_hotplug() -> bool {
        true
    }
}

/// Audit logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "AuditConfig::default_path")]
    pub path: PathBuf,
    /// Maximum log file size in MB before rotation
    #[serde(default)]
    pub max_size_mb: Option<u32>,
    /// Maximum number of rotated files to keep
    #[serde(default)]
    pub max_files: Option<u32>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: Self::default_path(),
            max_size_mb: Some(10),
            max_files: Some(5),
        }
    }
}

impl AuditConfig {
    fn default_path() -> PathBuf {
        if let Some(data_dir) = dirs::data_local_dir() {
            data_dir.join("usbwall").join("audit.log")
        } else {
            PathBuf::from("/var/log/usbwall/audit.log")
        }
    }

    /// Copy of this config with the log path expanded
    pub fn expanded(&self) -> Self {
        Self {
            path: expand_path(&self.path),
            ..self.clone()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                service_mode: false,
                log_level: "info".to_string(),
                trace_level: TraceLevel::default(),
            },
            control: ControlSettings::default(),
            usb: UsbSettings::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the specified path
    ///
    /// Without a path the standard locations are tried in order.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            expand_path(&p)
        } else {
            Self::search_paths()
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usbwall").join("server.toml")
        } else {
            PathBuf::from(".config/usbwall/server.toml")
        }
    }

    /// Locations tried by [`ServerConfig::load`] when no path is given
    pub fn search_paths() -> Vec<PathBuf> {
        vec![
            Self::default_path(),
            PathBuf::from("/etc/usbwall/server.toml"),
        ]
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.server.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.server.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.control.socket_path.as_os_str().is_empty() {
            return Err(anyhow!("Control socket path must not be empty"));
        }

        if self.control.socket_mode > 0o777 {
            return Err(anyhow!(
                "Invalid socket mode {:#o}, must be at most 0o777",
                self.control.socket_mode
            ));
        }

        if self.audit.enabled && self.audit.path.as_os_str().is_empty() {
            return Err(anyhow!("Audit log path must not be empty"));
        }

        if self.audit.max_size_mb == Some(0) {
            return Err(anyhow!("audit.max_size_mb must be at least 1"));
        }

        if self.audit.max_files == Some(0) {
            return Err(anyhow!("audit.max_files must be at least 1"));
        }

        Ok(())
    }
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(&raw).as_ref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.server.trace_level, TraceLevel::Info);
        assert!(config.usb.hotplug);
        assert!(!config.audit.enabled);
        assert_eq!(config.control.socket_mode, 0o660);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = ServerConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ServerConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = ServerConfig::default();
        config.server.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.server.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_socket_mode() {
        let mut config = ServerConfig::default();
        config.control.socket_mode = 0o1777;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_path(Path::new("~/usbwall.sock"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}
