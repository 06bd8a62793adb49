use std::time::Duration;

/// What to do when a packet or node-batch handler returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Latch the failure: `process_chunk` returns the error and keeps
    /// returning it until `reset` is called.
    #[default]
    Halt,
    /// Report the failure through the error handler and keep parsing. The
    /// failed packet is not counted as processed.
    Continue,
}

/// Configuration for [`ActionPacketParser`](crate::ActionPacketParser).
///
/// Options may be read and replaced between `process_chunk` calls; updates
/// take effect immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Cap on the retained byte buffer (unparsed tail plus any packet window
    /// held across chunks). Exceeding it is fatal.
    ///
    /// # Default
    ///
    /// 100 MiB
    pub max_buffer_bytes: usize,

    /// Cap on a single packet's staged size. A packet one byte over the cap
    /// is dropped with [`PacketTooLarge`](crate::ErrorKind::PacketTooLarge);
    /// a packet exactly at the cap is delivered.
    ///
    /// # Default
    ///
    /// 10 MiB
    pub max_packet_bytes: usize,

    /// Node descriptors per tree-batch flush.
    ///
    /// # Default
    ///
    /// 1000
    pub max_batch_count: usize,

    /// Bytes per tree-batch flush.
    ///
    /// # Default
    ///
    /// 10 MiB
    pub max_batch_bytes: usize,

    /// Emit periodic progress log lines while processing.
    ///
    /// # Default
    ///
    /// `false`
    pub diagnostics: bool,

    /// Minimum gap between progress lines.
    ///
    /// # Default
    ///
    /// 5 seconds
    pub progress_interval: Duration,

    /// Behavior when a handler returns an error.
    ///
    /// # Default
    ///
    /// [`FailurePolicy::Halt`]
    pub handler_failure: FailurePolicy,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_buffer_bytes: 100 * 1024 * 1024,
            max_packet_bytes: 10 * 1024 * 1024,
            max_batch_count: 1000,
            max_batch_bytes: 10 * 1024 * 1024,
            diagnostics: false,
            progress_interval: Duration::from_secs(5),
            handler_failure: FailurePolicy::default(),
        }
    }
}

/// Configuration for the generic [`JsonSplitter`](crate::JsonSplitter) core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterOptions {
    /// Cap on the retained byte buffer. Exceeding it is fatal.
    pub max_buffer_bytes: usize,
    /// Cap on a single capture window. An overgrown capture is delivered as
    /// [`Captured::Overflowed`](crate::Captured::Overflowed) instead of its
    /// bytes; parsing continues.
    pub max_capture_bytes: usize,
    /// Maximum container nesting depth.
    pub max_depth: usize,
}

impl Default for SplitterOptions {
    fn default() -> Self {
        Self {
            max_buffer_bytes: 100 * 1024 * 1024,
            max_capture_bytes: 10 * 1024 * 1024,
            max_depth: 128,
        }
    }
}

impl From<ParserOptions> for SplitterOptions {
    fn from(opts: ParserOptions) -> Self {
        Self {
            max_buffer_bytes: opts.max_buffer_bytes,
            max_capture_bytes: opts.max_packet_bytes,
            max_depth: SplitterOptions::default().max_depth,
        }
    }
}
