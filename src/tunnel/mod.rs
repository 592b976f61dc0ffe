//! Tunnel data path.
//!
//! This module contains:
//! - Uplink pump (device to transport, with client padding)
//! - Downlink pump (transport to device, padding discarded)
//! - Padding pacer and traffic counters
//! - Tunnel runner coordinating shutdown of both pumps

mod downlink;
mod pacing;
mod runner;
mod stats;
mod uplink;

pub use downlink::{DownlinkExit, DownlinkPump};
pub use pacing::{Pacer, MAX_PACING_LAG};
pub use runner::{BrokenTransportHandle, RunnerConfig, Session, TunnelRunner};
pub use stats::{StatsSnapshot, TunnelStats};
pub use uplink::UplinkPump;
