//! Point-to-point TUN/TAP tunnel over a single TCP connection.
//!
//! Frames read from a local virtual device are length-prefixed and written to
//! the peer; frames read from the peer are written back to the device. The
//! client end also emits fixed-size padding frames whenever it is idle.

pub mod adapter;
pub mod config;
pub mod error;
pub mod net;
pub mod protocol;
pub mod tunnel;

pub use config::{DeviceKind, PacingConfig, Role, TunnelConfig};
pub use error::{Error, Result};
pub use tunnel::{BrokenTransportHandle, DownlinkExit, RunnerConfig, Session, TunnelRunner};

/// Default TCP port for both ends.
pub const DEFAULT_PORT: u16 = 55555;
