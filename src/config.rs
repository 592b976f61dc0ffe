//! Configuration management for the tunnel forwarder

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::DEFAULT_PORT;

/// Longest interface name the kernel accepts (IFNAMSIZ - 1).
pub const MAX_INTERFACE_NAME: usize = 15;

/// Default padding cadence in microseconds.
pub const DEFAULT_PAD_INTERVAL_US: u64 = 500;

/// Which end of the tunnel this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Connects out; polls the device and emits padding when idle.
    Client,
    /// Accepts one connection; blocks on the device, no padding.
    Server,
}

impl Role {
    /// Whether the uplink pump injects padding frames in this role.
    #[inline]
    pub fn pads_uplink(self) -> bool {
        matches!(self, Role::Client)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

/// Virtual device flavour. Only changes what a payload represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Raw IP packets.
    #[default]
    Tun,
    /// Ethernet-like link-layer frames.
    Tap,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Tun => write!(f, "tun"),
            DeviceKind::Tap => write!(f, "tap"),
        }
    }
}

/// Client-side padding cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Pause after each padding frame, in microseconds.
    #[serde(default = "default_pad_interval_us")]
    pub interval_us: u64,
}

impl PacingConfig {
    /// Padding interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_micros(self.interval_us)
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            interval_us: DEFAULT_PAD_INTERVAL_US,
        }
    }
}

/// Tunnel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// TUN/TAP interface name
    pub interface: String,

    /// Client or server
    pub role: Role,

    /// Server address to connect to (client role only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// Port to listen on or connect to (default: 55555)
    #[serde(default = "default_port")]
    pub port: u16,

    /// TUN (default) or TAP
    #[serde(default)]
    pub device_kind: DeviceKind,

    /// Padding cadence
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Set TCP_NODELAY on the transport
    #[serde(default = "default_true")]
    pub nodelay: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_pad_interval_us() -> u64 {
    DEFAULT_PAD_INTERVAL_US
}
fn default_true() -> bool {
    true
}

impl TunnelConfig {
    /// Create a client configuration with defaults.
    pub fn client(interface: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            role: Role::Client,
            server: Some(server.into()),
            port: DEFAULT_PORT,
            device_kind: DeviceKind::Tun,
            pacing: PacingConfig::default(),
            nodelay: true,
        }
    }

    /// Create a server configuration with defaults.
    pub fn server(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            role: Role::Server,
            server: None,
            port: DEFAULT_PORT,
            device_kind: DeviceKind::Tun,
            pacing: PacingConfig::default(),
            nodelay: true,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.interface.is_empty() {
            return Err(Error::config("Must specify interface name"));
        }
        if self.interface.len() > MAX_INTERFACE_NAME {
            return Err(Error::config(format!(
                "Interface name '{}' longer than {} bytes",
                self.interface, MAX_INTERFACE_NAME
            )));
        }
        if self.role == Role::Client
            && self.server.as_deref().map_or(true, |s| s.trim().is_empty())
        {
            return Err(Error::config("Must specify server address"));
        }
        if self.pacing.interval_us == 0 {
            return Err(Error::config("Padding interval must be greater than zero"));
        }
        Ok(())
    }
}

pub mod io {
    use super::*;
    use std::path::Path;

    /// Load a tunnel configuration from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<TunnelConfig> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| Error::config(format!("Invalid JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults() {
        let config = TunnelConfig::client("tun0", "10.0.0.1");
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.port, 55555);
        assert_eq!(config.device_kind, DeviceKind::Tun);
        assert_eq!(config.pacing.interval(), Duration::from_micros(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_only_client_pads() {
        assert!(Role::Client.pads_uplink());
        assert!(!Role::Server.pads_uplink());
    }

    #[test]
    fn test_validate_missing_interface() {
        let config = TunnelConfig::server("");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_long_interface() {
        let config = TunnelConfig::server("averyveryverylongname");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_client_without_server() {
        let mut config = TunnelConfig::client("tun0", "10.0.0.1");
        config.server = None;
        assert!(config.validate().is_err());

        config.server = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = TunnelConfig::client("tun0", "10.0.0.1");
        config.pacing.interval_us = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{ "interface": "tap1", "role": "server", "device_kind": "tap" }"#;
        let config: TunnelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.role, Role::Server);
        assert_eq!(config.device_kind, DeviceKind::Tap);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.pacing.interval_us, DEFAULT_PAD_INTERVAL_US);
        assert!(config.nodelay);
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunnel.json");
        std::fs::write(
            &path,
            r#"{ "interface": "tun0", "role": "client", "server": "192.0.2.7",
                 "port": 4000, "pacing": { "interval_us": 1000 } }"#,
        )
        .unwrap();

        let config = io::load_json(&path).unwrap();
        assert_eq!(config.server.as_deref(), Some("192.0.2.7"));
        assert_eq!(config.port, 4000);
        assert_eq!(config.pacing.interval(), Duration::from_millis(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_json_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(io::load_json(&path), Err(Error::Config(_))));
    }
}
