//! TCP session setup.

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Listen backlog for the server socket.
const LISTEN_BACKLOG: u32 = 5;

/// Connect to the tunnel server.
pub async fn connect(server: &str, port: u16, nodelay: bool) -> Result<TcpStream> {
    let addr = resolve_address(server, port).await?;
    debug!("Connecting to {} ({})", server, addr);

    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(nodelay)?;

    info!(peer = %addr, "CLIENT: Connected to server");
    Ok(stream)
}

/// Wait for exactly one client on `port` and return its connection.
///
/// The listening socket is closed once the client is accepted.
pub async fn accept(port: u16, nodelay: bool) -> Result<TcpStream> {
    let local = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(local)?;
    let listener = socket.listen(LISTEN_BACKLOG)?;
    info!(addr = %local, "SERVER: Waiting for client");

    let (stream, remote) = listener.accept().await?;
    stream.set_nodelay(nodelay)?;

    info!(peer = %remote, "SERVER: Client connected");
    Ok(stream)
}

/// Split a connected stream into independently owned transport halves.
pub fn split(stream: TcpStream) -> (OwnedReadHalf, OwnedWriteHalf) {
    stream.into_split()
}

async fn resolve_address(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| Error::config(format!("Could not resolve server address '{host}'")))
}
