//! Processing counters and timing.

use std::time::{Duration, Instant};

/// Monotonic statistics for one parser lifetime.
///
/// Counters only ever increase between `reset` calls. [`stats`] returns a
/// value copy, so a snapshot stays internally consistent however the host
/// uses it.
///
/// [`stats`]: crate::ActionPacketParser::stats
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Stats {
    /// Input bytes absorbed by `process_chunk`.
    pub bytes_processed: u64,
    /// Packets dispatched to a handler (or the default sink).
    pub packets_processed: u64,
    /// Packets that were staged across a chunk boundary, or dropped while
    /// staged (oversize).
    pub partial_packets: u64,
    /// Tree (`t`) elements entered.
    pub large_elements: u64,
    /// Node batches flushed downstream.
    pub tree_batches: u64,
    /// Largest packet delivered, in bytes.
    pub max_packet_size: usize,
    /// High-water mark of retained buffer plus pending batch bytes.
    pub peak_memory: usize,
    /// Wall time spent inside `process_chunk`.
    pub total_processing_time: Duration,
    /// Set on construction and on `reset`.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub start_time: Instant,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self {
            bytes_processed: 0,
            packets_processed: 0,
            partial_packets: 0,
            large_elements: 0,
            tree_batches: 0,
            max_packet_size: 0,
            peak_memory: 0,
            total_processing_time: Duration::ZERO,
            start_time: Instant::now(),
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    /// Time elapsed since construction or the last `reset`.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
