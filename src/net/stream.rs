//! Transport stream helpers.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Read half of a transport: an ordered byte stream that may short-read.
pub trait TransportReader: AsyncRead + Unpin + Send + 'static {}

impl<T: AsyncRead + Unpin + Send + 'static> TransportReader for T {}

/// Write half of a transport.
pub trait TransportWriter: AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncWrite + Unpin + Send + 'static> TransportWriter for T {}

/// Result of [`read_full`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The buffer was filled completely.
    Complete,
    /// The stream ended after `read` bytes.
    Eof { read: usize },
}

impl ReadOutcome {
    /// Whether the buffer was filled.
    #[inline]
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Fill `buf` completely, looping over short reads.
///
/// End-of-stream is reported as [`ReadOutcome::Eof`] rather than an error so
/// callers can tell a peer close apart from a transport fault.
pub async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<ReadOutcome>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => return Ok(ReadOutcome::Eof { read: filled }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(ReadOutcome::Complete)
}
