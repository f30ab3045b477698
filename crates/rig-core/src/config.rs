//! Fleet configuration.
//!
//! Injected explicitly into the manager and daemons at initialization;
//! there is no process-wide configuration singleton.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Tunables for the fleet control plane, loadable from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Maximum number of emulator slots that can be allocated at once.
    pub max_emulators: u32,
    /// Maximum number of no-device runs that can be allocated at once.
    pub max_null_endpoints: u32,
    /// Seconds between recovery attempts for unavailable endpoints.
    pub recovery_interval_secs: u64,
    /// Seconds between bootloader-mode listing polls.
    pub bootloader_poll_interval_secs: u64,
    /// Timeout in seconds for the bootloader listing command.
    pub bootloader_cmd_timeout_secs: u64,
    /// Timeout in seconds for the responsiveness check on a new endpoint.
    pub availability_check_timeout_secs: u64,
    /// How long a pool worker waits for its endpoint to come back.
    pub recovery_wait_timeout_secs: u64,
    /// Whether a recovered endpoint is power-cycled before reuse.
    pub reboot_on_recovery: bool,
    /// Timeout in seconds for best-effort attribute fetches in listings.
    pub attribute_fetch_timeout_secs: u64,
    /// Seconds between attempts to connect a network-attached endpoint.
    pub tcp_connect_retry_delay_secs: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            max_emulators: 1,
            max_null_endpoints: 1,
            recovery_interval_secs: 10 * 60,
            bootloader_poll_interval_secs: 5,
            bootloader_cmd_timeout_secs: 60,
            availability_check_timeout_secs: 30,
            recovery_wait_timeout_secs: 5 * 60,
            reboot_on_recovery: true,
            attribute_fetch_timeout_secs: 2,
            tcp_connect_retry_delay_secs: 5,
        }
    }
}

impl FleetConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }

    pub fn bootloader_poll_interval(&self) -> Duration {
        Duration::from_secs(self.bootloader_poll_interval_secs)
    }

    pub fn bootloader_cmd_timeout(&self) -> Duration {
        Duration::from_secs(self.bootloader_cmd_timeout_secs)
    }

    pub fn availability_check_timeout(&self) -> Duration {
        Duration::from_secs(self.availability_check_timeout_secs)
    }

    pub fn recovery_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_wait_timeout_secs)
    }

    pub fn attribute_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.attribute_fetch_timeout_secs)
    }

    pub fn tcp_connect_retry_delay(&self) -> Duration {
        Duration::from_secs(self.tcp_connect_retry_delay_secs)
    }
}
