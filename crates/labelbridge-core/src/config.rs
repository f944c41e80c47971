// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LabelBridgeError, Result};
use crate::types::LabelSize;

/// Settings for the serial label driver.
///
/// Data bits, parity, and stop bits are fixed at 8-N-1; only the baud rate
/// is configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub enabled: bool,
    /// Explicit port paths.  Empty means enumerate the system's ports.
    pub ports: Vec<String>,
    pub baud_rate: u32,
    /// Logical printer names are `<name_prefix><port>`.
    pub name_prefix: String,
    /// Read/write bound for status queries and connection tests.
    pub status_timeout_ms: u64,
    /// Read/write bound for a whole print operation.
    pub print_timeout_ms: u64,
    /// Pause after each command segment.  Doubled after initialize.
    pub command_delay_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ports: Vec::new(),
            baud_rate: 115_200,
            name_prefix: "Serial-".into(),
            status_timeout_ms: 3_000,
            print_timeout_ms: 10_000,
            command_delay_ms: 50,
        }
    }
}

impl SerialConfig {
    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn print_timeout(&self) -> Duration {
        Duration::from_millis(self.print_timeout_ms)
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }
}

/// Settings for the network label driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub enabled: bool,
    /// Candidate printer hosts probed during discovery.
    pub hosts: Vec<String>,
    /// Candidate ports probed on every host.
    pub ports: Vec<u16>,
    /// Logical printer names are `<name_prefix><host>:<port>`.
    pub name_prefix: String,
    /// Connect bound for the discovery probe.
    pub probe_timeout_ms: u64,
    pub status_timeout_ms: u64,
    pub print_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hosts: vec![
                "192.168.1.100".into(),
                "192.168.1.101".into(),
                "192.168.1.102".into(),
            ],
            ports: vec![9100, 515, 631],
            name_prefix: "Net-".into(),
            probe_timeout_ms: 500,
            status_timeout_ms: 3_000,
            print_timeout_ms: 10_000,
        }
    }
}

impl NetworkConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn print_timeout(&self) -> Duration {
        Duration::from_millis(self.print_timeout_ms)
    }
}

/// Persistent bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub serial: SerialConfig,
    pub network: NetworkConfig,
    /// Logical names served by the in-memory loopback driver.
    pub loopback_printers: Vec<String>,
    /// How many render previews the worker keeps.
    pub preview_capacity: usize,
    /// Label size used when a front-end omits one.
    pub default_label: LabelSize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            network: NetworkConfig::default(),
            loopback_printers: Vec::new(),
            preview_capacity: 20,
            default_label: LabelSize::default(),
        }
    }
}

impl BridgeConfig {
    /// Read a config file.  Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject settings no driver can run with.
    pub fn validate(&self) -> Result<()> {
        if self.serial.enabled && self.serial.baud_rate == 0 {
            return Err(LabelBridgeError::Config("serial baud_rate must be non-zero".into()));
        }
        if self.preview_capacity == 0 {
            return Err(LabelBridgeError::Config("preview_capacity must be at least 1".into()));
        }
        if self.network.enabled && self.network.probe_timeout_ms == 0 {
            return Err(LabelBridgeError::Config("network probe_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }
}
