//! Tunnel runner - session ownership and shutdown coordination.
//!
//! The runner spawns both pumps for one session and decides how the session
//! ends:
//! - downlink sees the peer close: stop the uplink, end cleanly
//! - broken transport (uplink write error or an external notification):
//!   cancel the uplink, wait for it, drop the downlink, fail
//! - any other fatal error from either pump: stop the sibling, fail

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{DownlinkExit, DownlinkPump, StatsSnapshot, TunnelStats, UplinkPump};
use crate::adapter::DevicePort;
use crate::config::{PacingConfig, Role};
use crate::error::{Error, Result};
use crate::net::{TransportReader, TransportWriter};

/// One device paired with one connected transport for the process lifetime.
pub struct Session<D: ?Sized, R, W> {
    device: Arc<D>,
    reader: R,
    writer: W,
}

impl<D, R, W> Session<D, R, W>
where
    D: DevicePort + ?Sized + 'static,
    R: TransportReader,
    W: TransportWriter,
{
    /// Pair a device with the two halves of a transport.
    pub fn new(device: Arc<D>, reader: R, writer: W) -> Self {
        Self {
            device,
            reader,
            writer,
        }
    }
}

impl<D> Session<D, tokio::net::tcp::OwnedReadHalf, tokio::net::tcp::OwnedWriteHalf>
where
    D: DevicePort + ?Sized + 'static,
{
    /// Pair a device with a connected TCP stream.
    pub fn from_tcp(device: Arc<D>, stream: TcpStream) -> Self {
        let (reader, writer) = crate::net::split(stream);
        Self::new(device, reader, writer)
    }
}

/// Raises the broken-transport event on a running [`TunnelRunner`].
#[derive(Debug, Clone)]
pub struct BrokenTransportHandle(CancellationToken);

impl BrokenTransportHandle {
    /// Signal that the transport can no longer be written.
    pub fn notify(&self) {
        self.0.cancel();
    }

    #[cfg(test)]
    fn is_notified(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Configuration for the tunnel runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Client or server; selects the uplink strategy.
    pub role: Role,
    /// Interval between client padding frames.
    pub pad_interval: Duration,
}

impl RunnerConfig {
    pub fn new(role: Role, pacing: &PacingConfig) -> Self {
        Self {
            role,
            pad_interval: pacing.interval(),
        }
    }
}

enum FirstExit {
    Downlink(std::result::Result<Result<DownlinkExit>, JoinError>),
    Uplink(std::result::Result<Result<()>, JoinError>),
    BrokenTransport,
}

/// Runs the two pumps of a session and coordinates their shutdown.
pub struct TunnelRunner {
    config: RunnerConfig,
    stats: Arc<TunnelStats>,
    broken: CancellationToken,
}

impl TunnelRunner {
    /// Create a new tunnel runner.
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            stats: Arc::new(TunnelStats::new()),
            broken: CancellationToken::new(),
        }
    }

    /// Handle for raising the broken-transport event from outside.
    pub fn broken_transport_handle(&self) -> BrokenTransportHandle {
        BrokenTransportHandle(self.broken.clone())
    }

    /// Shared traffic counters.
    pub fn stats(&self) -> Arc<TunnelStats> {
        self.stats.clone()
    }

    /// Relay traffic until the session ends.
    ///
    /// Returns how the downlink ended on a clean peer close, or the fatal
    /// error that ended the session. Both pumps have stopped when this
    /// returns.
    pub async fn run<D, R, W>(&self, session: Session<D, R, W>) -> Result<DownlinkExit>
    where
        D: DevicePort + ?Sized + 'static,
        R: TransportReader,
        W: TransportWriter,
    {
        let Session {
            device,
            reader,
            writer,
        } = session;

        let uplink_cancel = CancellationToken::new();
        let uplink = UplinkPump::new(
            device.clone(),
            writer,
            self.config.role,
            self.config.pad_interval,
            self.stats.clone(),
            uplink_cancel.clone(),
        );
        let downlink = DownlinkPump::new(device, reader, self.stats.clone());

        let mut uplink_task = tokio::spawn(uplink.run());
        let mut downlink_task = tokio::spawn(downlink.run());
        info!(role = %self.config.role, "Tunnel active");

        let first = tokio::select! {
            biased;
            res = &mut downlink_task => FirstExit::Downlink(res),
            res = &mut uplink_task => FirstExit::Uplink(res),
            _ = self.broken.cancelled() => FirstExit::BrokenTransport,
        };

        let outcome = match first {
            FirstExit::Downlink(res) => {
                stop_uplink(&uplink_cancel, uplink_task).await;
                flatten(res)
            }
            FirstExit::Uplink(res) => {
                downlink_task.abort();
                match flatten(res) {
                    Ok(()) => Err(Error::TaskFailed("uplink stopped unexpectedly".into())),
                    Err(e) => Err(e),
                }
            }
            FirstExit::BrokenTransport => {
                warn!("Broken transport signalled, cancelling tap to net pump");
                stop_uplink(&uplink_cancel, uplink_task).await;
                downlink_task.abort();
                Err(Error::TransportBroken)
            }
        };

        match &outcome {
            Ok(exit) => info!(?exit, "Tunnel closed by peer"),
            Err(e) => error!(error = %e, "Tunnel terminated"),
        }
        log_summary(&self.stats.snapshot());
        outcome
    }
}

async fn stop_uplink(cancel: &CancellationToken, task: JoinHandle<Result<()>>) {
    cancel.cancel();
    match task.await {
        Ok(Ok(())) => debug!("tap to net pump stopped"),
        Ok(Err(e)) => debug!(error = %e, "tap to net pump ended with error during shutdown"),
        Err(e) => warn!(error = %e, "tap to net pump task failed"),
    }
}

fn flatten<T>(res: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    res.map_err(|e| Error::TaskFailed(e.to_string()))?
}

fn log_summary(stats: &StatsSnapshot) {
    info!(
        data_sent = stats.data_frames_sent,
        bytes_sent = stats.data_bytes_sent,
        padding_sent = stats.padding_frames_sent,
        data_received = stats.data_frames_received,
        bytes_received = stats.data_bytes_received,
        padding_discarded = stats.padding_frames_discarded,
        "Tunnel traffic summary"
    );
}
