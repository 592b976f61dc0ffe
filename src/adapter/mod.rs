//! Virtual network device adapter.
//!
//! This module provides the device side of the tunnel: the [`DevicePort`]
//! trait the pumps are written against, the Linux TUN/TAP implementation,
//! and an in-memory device for embedding and tests.

mod memory;

#[cfg(target_os = "linux")]
mod tun_linux;

pub use memory::{MemoryDevice, MemoryDeviceHandle};

#[cfg(target_os = "linux")]
pub use tun_linux::TunDevice;

use std::io;

use async_trait::async_trait;

pub use crate::config::DeviceKind;

/// A readable/writable raw-frame endpoint.
///
/// Both pumps share one device: the uplink only reads, the downlink only
/// writes, so implementations must allow one reader and one writer at the
/// same time through `&self`.
#[async_trait]
pub trait DevicePort: Send + Sync {
    /// Get the device name.
    fn name(&self) -> &str;

    /// Whether payloads are IP packets or link-layer frames.
    fn kind(&self) -> DeviceKind;

    /// Wait for the next frame and read it into `buf`.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Read a frame if one is ready right now.
    ///
    /// `Ok(None)` means "no data now", never "closed".
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>>;

    /// Write one frame to the device.
    async fn send(&self, buf: &[u8]) -> io::Result<usize>;
}
