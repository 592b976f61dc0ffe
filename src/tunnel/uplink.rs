//! Device to transport pump.
//!
//! Client role polls the device and fills idle time with padding frames at a
//! fixed cadence. Server role simply waits on the device. Every await point
//! races the cancellation token, so the coordinator can stop this pump in
//! the middle of a read, a write or a padding sleep.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{Pacer, TunnelStats};
use crate::adapter::DevicePort;
use crate::config::Role;
use crate::error::{Error, Result};
use crate::net::TransportWriter;
use crate::protocol::{encode_data_into, encode_padding, HEADER_SIZE, MAX_FRAME_PAYLOAD};

/// Uplink pump state.
pub struct UplinkPump<D: ?Sized, W> {
    device: Arc<D>,
    writer: W,
    role: Role,
    pad_interval: Duration,
    stats: Arc<TunnelStats>,
    cancel: CancellationToken,
}

impl<D, W> UplinkPump<D, W>
where
    D: DevicePort + ?Sized,
    W: TransportWriter,
{
    pub fn new(
        device: Arc<D>,
        writer: W,
        role: Role,
        pad_interval: Duration,
        stats: Arc<TunnelStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            device,
            writer,
            role,
            pad_interval,
            stats,
            cancel,
        }
    }

    /// Run until cancelled or a fatal error occurs.
    ///
    /// Returns `Ok(())` only after cancellation.
    pub async fn run(mut self) -> Result<()> {
        info!(role = %self.role, device = %self.device.name(), "tap to net pump is up");
        let result = if self.role.pads_uplink() {
            self.run_padded().await
        } else {
            self.run_blocking().await
        };
        if result.is_ok() {
            debug!("tap to net pump cancelled");
        }
        result
    }

    async fn run_padded(&mut self) -> Result<()> {
        let padding = encode_padding();
        let mut pacer = Pacer::new(self.pad_interval);
        debug!(interval = ?pacer.interval(), "Padding enabled");
        let mut buf = vec![0u8; MAX_FRAME_PAYLOAD];
        let mut frame = BytesMut::with_capacity(HEADER_SIZE + MAX_FRAME_PAYLOAD);

        while !self.cancel.is_cancelled() {
            let nread = self
                .device
                .try_recv(&mut buf)
                .map_err(|e| Error::device(format!("read from {}: {e}", self.device.name())))?
                .unwrap_or(0);

            if nread > 0 {
                encode_data_into(&buf[..nread], &mut frame)?;
                if !self.write_frame(&frame).await? {
                    break;
                }
                self.stats.record_data_sent(nread);
                debug!("TAP2NET: Written {} bytes to the network", nread);
                continue;
            }

            // Nothing to send: wait for the next padding slot, then look at
            // the device again before filling it.
            let now = Instant::now();
            let due = pacer.next_deadline(now);
            if due > now {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep_until(due) => {}
                }
                continue;
            }

            if !self.write_frame(&padding).await? {
                break;
            }
            pacer.mark_sent();
            self.stats.record_padding_sent();
            trace!("TAP2NET: Written padding frame to the network");
        }
        Ok(())
    }

    async fn run_blocking(&mut self) -> Result<()> {
        let mut buf = vec![0u8; MAX_FRAME_PAYLOAD];
        let mut frame = BytesMut::with_capacity(HEADER_SIZE + MAX_FRAME_PAYLOAD);

        loop {
            let nread = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                res = self.device.recv(&mut buf) => res.map_err(|e| {
                    Error::device(format!("read from {}: {e}", self.device.name()))
                })?,
            };

            if nread == 0 {
                trace!("TAP2NET: Empty read from the device, skipped");
                continue;
            }

            encode_data_into(&buf[..nread], &mut frame)?;
            if !self.write_frame(&frame).await? {
                return Ok(());
            }
            self.stats.record_data_sent(nread);
            debug!("TAP2NET: Written {} bytes to the network", nread);
        }
    }

    /// Write one whole frame. Returns `false` if cancelled first.
    async fn write_frame(&mut self, frame: &[u8]) -> Result<bool> {
        let writer = &mut self.writer;
        let cancel = &self.cancel;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(false),
            res = async {
                writer.write_all(frame).await?;
                writer.flush().await
            } => {
                res.map_err(Error::from_transport_write)?;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryDevice;
    use crate::config::DeviceKind;
    use crate::protocol::{Frame, PADDING_FRAME_LEN};
    use bytes::Bytes;
    use tokio::io::AsyncReadExt;

    const INTERVAL: Duration = Duration::from_micros(500);

    #[tokio::test(start_paused = true)]
    async fn test_client_pads_when_idle() {
        let (device, _handle) = MemoryDevice::new("mem0", DeviceKind::Tun);
        let (writer, mut wire) = tokio::io::duplex(1 << 20);
        let stats = Arc::new(TunnelStats::new());
        let cancel = CancellationToken::new();

        let pump = UplinkPump::new(
            Arc::new(device),
            writer,
            Role::Client,
            INTERVAL,
            stats.clone(),
            cancel.clone(),
        );
        let task = tokio::spawn(pump.run());

        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        let sent = stats.snapshot().padding_frames_sent;
        assert!((9..=12).contains(&sent), "sent {sent} padding frames in 5ms");
        assert_eq!(stats.snapshot().data_frames_sent, 0);

        let mut raw = Vec::new();
        wire.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw.len() as u64, sent * PADDING_FRAME_LEN as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_sends_data_without_padding_first() {
        let (device, handle) = MemoryDevice::new("mem0", DeviceKind::Tun);
        handle.inject(Bytes::from_static(&[0xAA, 0xBB, 0xCC])).unwrap();

        let (writer, mut wire) = tokio::io::duplex(1 << 20);
        let stats = Arc::new(TunnelStats::new());
        let cancel = CancellationToken::new();
        let pump = UplinkPump::new(
            Arc::new(device),
            writer,
            Role::Client,
            INTERVAL,
            stats.clone(),
            cancel.clone(),
        );
        let task = tokio::spawn(pump.run());

        let mut head = [0u8; 5];
        wire.read_exact(&mut head).await.unwrap();
        assert_eq!(head, [0x00, 0x03, 0xAA, 0xBB, 0xCC]);

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(stats.snapshot().data_bytes_sent, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_never_pads() {
        let (device, handle) = MemoryDevice::new("mem0", DeviceKind::Tap);
        let (writer, mut wire) = tokio::io::duplex(1 << 20);
        let stats = Arc::new(TunnelStats::new());
        let cancel = CancellationToken::new();
        let pump = UplinkPump::new(
            Arc::new(device),
            writer,
            Role::Server,
            INTERVAL,
            stats.clone(),
            cancel.clone(),
        );
        let task = tokio::spawn(pump.run());

        tokio::time::sleep(Duration::from_millis(5)).await;
        handle.inject(Bytes::from_static(b"frame")).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        let mut raw = Vec::new();
        wire.read_to_end(&mut raw).await.unwrap();
        let (frame, used) = Frame::decode(&raw).unwrap().unwrap();
        assert_eq!(frame, Frame::Data(Bytes::from_static(b"frame")));
        assert_eq!(used, raw.len());
        assert_eq!(stats.snapshot().padding_frames_sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_sleep_is_prompt() {
        let (device, _handle) = MemoryDevice::new("mem0", DeviceKind::Tun);
        let (writer, _wire) = tokio::io::duplex(1 << 20);
        let cancel = CancellationToken::new();
        let pump = UplinkPump::new(
            Arc::new(device),
            writer,
            Role::Client,
            Duration::from_secs(3600),
            Arc::new(TunnelStats::new()),
            cancel.clone(),
        );
        let task = tokio::spawn(pump.run());
        tokio::task::yield_now().await;

        let start = tokio::time::Instant::now();
        cancel.cancel();
        tokio::time::timeout(Duration::from_millis(10), task)
            .await
            .expect("uplink did not stop in time")
            .unwrap()
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_broken_transport_reported() {
        let (device, _handle) = MemoryDevice::new("mem0", DeviceKind::Tun);
        let (writer, wire) = tokio::io::duplex(64);
        drop(wire);

        let pump = UplinkPump::new(
            Arc::new(device),
            writer,
            Role::Client,
            INTERVAL,
            Arc::new(TunnelStats::new()),
            CancellationToken::new(),
        );
        let err = pump.run().await.unwrap_err();
        assert!(err.is_broken_transport(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_device_fault_is_fatal() {
        let (device, handle) = MemoryDevice::new("mem0", DeviceKind::Tun);
        drop(handle);
        let (writer, _wire) = tokio::io::duplex(1 << 16);

        let pump = UplinkPump::new(
            Arc::new(device),
            writer,
            Role::Server,
            INTERVAL,
            Arc::new(TunnelStats::new()),
            CancellationToken::new(),
        );
        assert!(matches!(pump.run().await, Err(Error::Device(_))));
    }
}
