//! In-memory device backed by channels.
//!
//! The handle side plays the role of the kernel: packets it injects show up
//! as device reads, and everything the tunnel writes to the device comes out
//! of the handle.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use super::{DeviceKind, DevicePort};

/// Channel-backed [`DevicePort`].
pub struct MemoryDevice {
    name: String,
    kind: DeviceKind,
    inbound: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    outbound: mpsc::UnboundedSender<Bytes>,
}

/// Kernel side of a [`MemoryDevice`].
pub struct MemoryDeviceHandle {
    inject: mpsc::UnboundedSender<Bytes>,
    delivered: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryDevice {
    /// Create a device and the handle that feeds it.
    pub fn new(name: impl Into<String>, kind: DeviceKind) -> (Self, MemoryDeviceHandle) {
        let (inject, inbound) = mpsc::unbounded_channel();
        let (outbound, delivered) = mpsc::unbounded_channel();

        let device = Self {
            name: name.into(),
            kind,
            inbound: Mutex::new(inbound),
            outbound,
        };
        (device, MemoryDeviceHandle { inject, delivered })
    }
}

fn copy_packet(packet: &[u8], buf: &mut [u8]) -> usize {
    // Oversized packets are truncated, as a short read from a real device would be.
    let n = packet.len().min(buf.len());
    buf[..n].copy_from_slice(&packet[..n]);
    n
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "memory device handle dropped")
}

#[async_trait]
impl DevicePort for MemoryDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        self.kind
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(packet) => Ok(copy_packet(&packet, buf)),
            None => Err(closed()),
        }
    }

    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let Ok(mut inbound) = self.inbound.try_lock() else {
            return Ok(None);
        };
        match inbound.try_recv() {
            Ok(packet) => Ok(Some(copy_packet(&packet, buf))),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(closed()),
        }
    }

    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.outbound
            .send(Bytes::copy_from_slice(buf))
            .map_err(|_| closed())?;
        Ok(buf.len())
    }
}

impl MemoryDeviceHandle {
    /// Make `packet` readable from the device.
    pub fn inject(&self, packet: impl Into<Bytes>) -> io::Result<()> {
        self.inject.send(packet.into()).map_err(|_| closed())
    }

    /// Wait for the next frame the tunnel wrote to the device.
    pub async fn next_delivered(&mut self) -> Option<Bytes> {
        self.delivered.recv().await
    }

    /// Take a delivered frame if one is queued.
    pub fn try_delivered(&mut self) -> Option<Bytes> {
        self.delivered.try_recv().ok()
    }
}
