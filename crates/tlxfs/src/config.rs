//! Daemon configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::SessionSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    #[serde(default)]
    pub mount: MountSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    /// Default log level; `RUST_LOG` and `--log-level` both override it.
    #[serde(default = "DaemonSettings::default_log_level")]
    pub log_level: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl DaemonSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// USB vendor id of the logger.
    #[serde(default = "UsbSettings::default_vendor_id")]
    pub vendor_id: u16,
    /// USB product id of the logger.
    #[serde(default = "UsbSettings::default_product_id")]
    pub product_id: u16,
    /// Bulk transfer timeout in milliseconds.
    #[serde(default = "UsbSettings::default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Pause after a heartbeat frame before polling again, in milliseconds.
    #[serde(default = "UsbSettings::default_heartbeat_delay_ms")]
    pub heartbeat_delay_ms: u64,
    /// Pause between device discovery attempts, in seconds.
    #[serde(default = "UsbSettings::default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            vendor_id: Self::default_vendor_id(),
            product_id: Self::default_product_id(),
            io_timeout_ms: Self::default_io_timeout_ms(),
            heartbeat_delay_ms: Self::default_heartbeat_delay_ms(),
            reconnect_interval_secs: Self::default_reconnect_interval_secs(),
        }
    }
}

impl UsbSettings {
    fn default_vendor_id() -> u16 {
        0x0451
    }

    fn default_product_id() -> u16 {
        0x3211
    }

    fn default_io_timeout_ms() -> u64 {
        1000
    }

    fn default_heartbeat_delay_ms() -> u64 {
        1000
    }

    fn default_reconnect_interval_secs() -> u64 {
        10
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            heartbeat_delay: Duration::from_millis(self.heartbeat_delay_ms),
            reconnect_interval: Duration::from_secs(self.reconnect_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MountSettings {
    /// Allow other users to read the mount (requires fuse.conf user_allow_other).
    #[serde(default)]
    pub allow_other: bool,
    /// Unmount automatically when the daemon exits.
    #[serde(default)]
    pub auto_unmount: bool,
}

impl Config {
    /// Load configuration from the specified path, or search the standard
    /// locations.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![Self::default_path(), PathBuf::from("/etc/tlxfs/config.toml")];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("no configuration file found"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::debug!("loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or fall back to defaults if none is found.
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("no usable config ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Default configuration file path.
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("tlxfs").join("config.toml")
        } else {
            PathBuf::from(".config/tlxfs/config.toml")
        }
    }

    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.daemon.log_level.as_str()) {
            return Err(anyhow!(
                "invalid log level '{}', must be one of: {}",
                self.daemon.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.usb.io_timeout_ms == 0 {
            return Err(anyhow!("io_timeout_ms must be greater than 0"));
        }

        if self.usb.reconnect_interval_secs == 0 {
            return Err(anyhow!("reconnect_interval_secs must be greater than 0"));
        }

        Ok(())
    }
}
