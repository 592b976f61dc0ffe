//! Transport to device pump.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use super::TunnelStats;
use crate::adapter::DevicePort;
use crate::error::{Error, Result};
use crate::net::{read_full, ReadOutcome, TransportReader};
use crate::protocol::{FrameHeader, HEADER_SIZE, MAX_FRAME_PAYLOAD, PADDING_PAYLOAD_LEN};

/// Why the downlink pump stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownlinkExit {
    /// The peer closed the stream on a frame boundary.
    PeerClosed,
    /// The peer closed the stream inside a frame; the partial frame was dropped.
    Truncated { missing: usize },
}

/// Downlink pump state.
pub struct DownlinkPump<D: ?Sized, R> {
    device: Arc<D>,
    reader: R,
    stats: Arc<TunnelStats>,
}

impl<D, R> DownlinkPump<D, R>
where
    D: DevicePort + ?Sized,
    R: TransportReader,
{
    pub fn new(device: Arc<D>, reader: R, stats: Arc<TunnelStats>) -> Self {
        Self {
            device,
            reader,
            stats,
        }
    }

    /// Run until the peer closes the stream or a fatal error occurs.
    pub async fn run(mut self) -> Result<DownlinkExit> {
        info!(device = %self.device.name(), "net to tap pump is up");
        let mut buf = vec![0u8; MAX_FRAME_PAYLOAD];

        loop {
            let mut raw = [0u8; HEADER_SIZE];
            match read_full(&mut self.reader, &mut raw).await? {
                ReadOutcome::Complete => {}
                ReadOutcome::Eof { read: 0 } => {
                    info!("Peer closed the connection");
                    return Ok(DownlinkExit::PeerClosed);
                }
                ReadOutcome::Eof { read } => return Ok(truncated(HEADER_SIZE - read)),
            }

            let header = FrameHeader::decode(raw).validate()?;
            let body = &mut buf[..header.body_len()];
            if let ReadOutcome::Eof { read } = read_full(&mut self.reader, body).await? {
                return Ok(truncated(body.len() - read));
            }

            if header.is_padding() {
                self.stats.record_padding_discarded();
                trace!(
                    "NET2TAP: Read {} padding bytes from the network and dropped them",
                    PADDING_PAYLOAD_LEN
                );
                continue;
            }

            let len = header.body_len();
            debug!("NET2TAP: Read {} bytes from the network", len);
            let nwrite = self.device.send(&buf[..len]).await.map_err(|e| {
                Error::device(format!("write to {}: {e}", self.device.name()))
            })?;
            self.stats.record_data_received(len);
            debug!("NET2TAP: Written {} bytes to the device", nwrite);
        }
    }
}

fn truncated(missing: usize) -> DownlinkExit {
    warn!(missing, "Peer closed the connection in the middle of a frame");
    DownlinkExit::Truncated { missing }
}
