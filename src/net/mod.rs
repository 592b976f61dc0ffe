//! Transport side of the tunnel.
//!
//! This module provides:
//! - Transport port traits over tokio's async byte streams
//! - The "read exactly N" primitive with end-of-stream detection
//! - TCP session setup (client connect / server accept)

mod connection;
mod stream;

pub use connection::{accept, connect, split};
pub use stream::{read_full, ReadOutcome, TransportReader, TransportWriter};
