//! Traffic counters shared by both pumps.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-session frame and byte counters.
#[derive(Debug, Default)]
pub struct TunnelStats {
    data_frames_sent: AtomicU64,
    data_bytes_sent: AtomicU64,
    padding_frames_sent: AtomicU64,
    data_frames_received: AtomicU64,
    data_bytes_received: AtomicU64,
    padding_frames_discarded: AtomicU64,
}

/// Point-in-time copy of [`TunnelStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub data_frames_sent: u64,
    pub data_bytes_sent: u64,
    pub padding_frames_sent: u64,
    pub data_frames_received: u64,
    pub data_bytes_received: u64,
    pub padding_frames_discarded: u64,
}

impl TunnelStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_data_sent(&self, bytes: usize) {
        self.data_frames_sent.fetch_add(1, Ordering::Relaxed);
        self.data_bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_padding_sent(&self) {
        self.padding_frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_data_received(&self, bytes: usize) {
        self.data_frames_received.fetch_add(1, Ordering::Relaxed);
        self.data_bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_padding_discarded(&self) {
        self.padding_frames_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            data_frames_sent: self.data_frames_sent.load(Ordering::Relaxed),
            data_bytes_sent: self.data_bytes_sent.load(Ordering::Relaxed),
            padding_frames_sent: self.padding_frames_sent.load(Ordering::Relaxed),
            data_frames_received: self.data_frames_received.load(Ordering::Relaxed),
            data_bytes_received: self.data_bytes_received.load(Ordering::Relaxed),
            padding_frames_discarded: self.padding_frames_discarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = TunnelStats::new();
        stats.record_data_sent(100);
        stats.record_data_sent(20);
        stats.record_padding_sent();
        stats.record_data_received(7);
        stats.record_padding_discarded();
        stats.record_padding_discarded();

        let snap = stats.snapshot();
        assert_eq!(snap.data_frames_sent, 2);
        assert_eq!(snap.data_bytes_sent, 120);
        assert_eq!(snap.padding_frames_sent, 1);
        assert_eq!(snap.data_frames_received, 1);
        assert_eq!(snap.data_bytes_received, 7);
        assert_eq!(snap.padding_frames_discarded, 2);
    }
}
