//! Actionpacket dispatching over the path-filtered splitter.
//!
//! [`ActionPacketParser`] layers the actionpacket protocol onto
//! [`JsonSplitter`]: it installs filters for the wire format's structural
//! positions, extracts each packet's action code, hands every packet (in
//! server order, exactly once) to the handler registered for its code, and
//! slices large tree (`t`) elements into bounded node batches so the
//! downstream ingest pipeline sees bounded memory no matter how large the
//! account is.
//!
//! A packet's bytes are valid JSON and byte-identical to its span of the
//! input; they are valid only for the duration of the handler call. The
//! parser is synchronous and single-owner: handlers must not feed it
//! re-entrantly, which the borrow checker already rules out.

mod batch;
mod stats;

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{ErrorKind, HandlerError, StreamError};
use crate::options::{FailurePolicy, ParserOptions};
use crate::splitter::{
    Captured, ContainerKind, FilterAction, FilterCx, FilterEvent, JsonSplitter, ScalarView,
};
use batch::TreeBatcher;
pub use batch::NodeBatch;
pub use stats::Stats;

type PacketHandler = Box<dyn FnMut(&str, &[u8]) -> Result<(), HandlerError>>;
type NodeBatchHandler = Box<dyn FnMut(&NodeBatch) -> Result<(), HandlerError>>;
type ErrorHandler = Box<dyn FnMut(&StreamError, bool)>;

/// An open packet window; `action` is captured from the packet's `a` field
/// as the object streams through.
#[derive(Debug, Default)]
struct PacketWindow {
    action: Option<String>,
}

/// Shared state threaded through the splitter filters as the sink.
struct Dispatch {
    handlers: HashMap<String, PacketHandler>,
    default_handler: Option<PacketHandler>,
    batch_handler: Option<NodeBatchHandler>,
    error_handler: Option<ErrorHandler>,
    stats: Stats,
    batcher: TreeBatcher,
    in_packet_array: bool,
    packet: Option<PacketWindow>,
    in_tree: bool,
    cursor: Option<String>,
    notify_url: Option<String>,
    policy: FailurePolicy,
    max_packet_bytes: usize,
    diagnostics: bool,
    progress_interval: Duration,
    last_progress: Instant,
    fatal_reported: bool,
}

impl Dispatch {
    fn new(options: &ParserOptions) -> Self {
        Self {
            handlers: HashMap::new(),
            default_handler: None,
            batch_handler: None,
            error_handler: None,
            stats: Stats::new(),
            batcher: TreeBatcher::new(options.max_batch_count, options.max_batch_bytes),
            in_packet_array: false,
            packet: None,
            in_tree: false,
            cursor: None,
            notify_url: None,
            policy: options.handler_failure,
            max_packet_bytes: options.max_packet_bytes,
            diagnostics: options.diagnostics,
            progress_interval: options.progress_interval,
            last_progress: Instant::now(),
            fatal_reported: false,
        }
    }

    fn apply_options(&mut self, options: &ParserOptions) {
        self.policy = options.handler_failure;
        self.max_packet_bytes = options.max_packet_bytes;
        self.diagnostics = options.diagnostics;
        self.progress_interval = options.progress_interval;
        self.batcher
            .set_limits(options.max_batch_count, options.max_batch_bytes);
    }

    fn reset(&mut self) {
        self.stats.reset();
        self.batcher.reset();
        self.in_packet_array = false;
        self.packet = None;
        self.in_tree = false;
        self.cursor = None;
        self.notify_url = None;
        self.fatal_reported = false;
        self.last_progress = Instant::now();
    }

    // ---- filter callbacks -------------------------------------------------

    fn on_document_start(&mut self, _cx: &FilterCx<'_>) -> Result<FilterAction, ErrorKind> {
        tracing::debug!("actionpacket stream started");
        Ok(FilterAction::Continue)
    }

    fn on_document_end(&mut self, _cx: &FilterCx<'_>) -> Result<FilterAction, ErrorKind> {
        if self.diagnostics {
            self.log_progress();
        }
        tracing::debug!(
            packets = self.stats.packets_processed,
            "actionpacket stream finished"
        );
        Ok(FilterAction::Continue)
    }

    fn on_packet_array(&mut self, cx: &FilterCx<'_>) -> Result<FilterAction, ErrorKind> {
        match cx.event {
            FilterEvent::ContainerOpen {
                kind: ContainerKind::Array,
            } => {
                self.in_packet_array = true;
                tracing::debug!("entering actionpacket array");
            }
            FilterEvent::ContainerClose { .. } => self.in_packet_array = false,
            _ => {}
        }
        Ok(FilterAction::Continue)
    }

    fn on_packet(&mut self, cx: &FilterCx<'_>) -> Result<FilterAction, ErrorKind> {
        match cx.event {
            FilterEvent::ContainerOpen {
                kind: ContainerKind::Object,
            } => {
                if !self.in_packet_array {
                    return Err(ErrorKind::Structure(
                        "actionpacket outside the actionpacket array",
                    ));
                }
                self.packet = Some(PacketWindow::default());
                Ok(FilterAction::Capture)
            }
            FilterEvent::ContainerClose { captured, .. } => {
                self.finish_packet(captured, cx.offset)?;
                Ok(FilterAction::Continue)
            }
            _ => Ok(FilterAction::Continue),
        }
    }

    fn on_action_code(&mut self, cx: &FilterCx<'_>) -> Result<FilterAction, ErrorKind> {
        if let FilterEvent::Scalar(scalar @ ScalarView::Str { .. }) = cx.event {
            if let Some(window) = self.packet.as_mut() {
                if window.action.is_none() {
                    window.action = scalar.decode().map(|code| code.into_owned());
                }
            }
        }
        Ok(FilterAction::Continue)
    }

    fn on_tree(&mut self, cx: &FilterCx<'_>) -> Result<FilterAction, ErrorKind> {
        match cx.event {
            FilterEvent::ContainerOpen {
                kind: ContainerKind::Array,
            } => {
                self.in_tree = true;
                self.stats.large_elements += 1;
                tracing::debug!("streaming tree element");
            }
            FilterEvent::ContainerClose { .. } => {
                self.in_tree = false;
                if let Some(batch) = self.batcher.take_partial() {
                    self.flush_batch(&batch, cx.offset)?;
                }
            }
            _ => {}
        }
        Ok(FilterAction::Continue)
    }

    fn on_node(&mut self, cx: &FilterCx<'_>) -> Result<FilterAction, ErrorKind> {
        match cx.event {
            FilterEvent::ContainerOpen {
                kind: ContainerKind::Object,
            } => Ok(FilterAction::Capture),
            FilterEvent::ContainerClose {
                captured: Some(Captured::Complete { bytes, .. }),
                ..
            } => {
                if self.batcher.push(bytes) {
                    let batch = self.batcher.take();
                    self.flush_batch(&batch, cx.offset)?;
                }
                Ok(FilterAction::Continue)
            }
            FilterEvent::ContainerClose {
                captured: Some(Captured::Overflowed { size }),
                ..
            } => {
                // Descriptor outgrew the packet cap; drop it, keep the batch.
                self.report(
                    StreamError::new(
                        ErrorKind::PacketTooLarge {
                            size,
                            limit: self.max_packet_bytes,
                        },
                        cx.offset,
                    ),
                    true,
                );
                Ok(FilterAction::Continue)
            }
            _ => Ok(FilterAction::Continue),
        }
    }

    fn on_cursor(&mut self, cx: &FilterCx<'_>) -> Result<FilterAction, ErrorKind> {
        if let FilterEvent::Scalar(scalar) = cx.event {
            if let Some(text) = scalar.decode() {
                self.cursor = Some(text.into_owned());
            }
        }
        Ok(FilterAction::Continue)
    }

    fn on_notify_url(&mut self, cx: &FilterCx<'_>) -> Result<FilterAction, ErrorKind> {
        if let FilterEvent::Scalar(scalar) = cx.event {
            if let Some(text) = scalar.decode() {
                self.notify_url = Some(text.into_owned());
            }
        }
        Ok(FilterAction::Continue)
    }

    fn on_error(&mut self, cx: &FilterCx<'_>) -> Result<FilterAction, ErrorKind> {
        if let FilterEvent::ParseError(err) = cx.event {
            self.fatal_reported = true;
            self.report(err.clone(), false);
        }
        // No resync: the host restarts the stream from its cursor.
        Ok(FilterAction::Continue)
    }

    // ---- packet and batch completion --------------------------------------

    fn finish_packet(
        &mut self,
        captured: Option<Captured<'_>>,
        offset: u64,
    ) -> Result<(), ErrorKind> {
        let Some(window) = self.packet.take() else {
            return Ok(());
        };
        match captured {
            Some(Captured::Complete { bytes, straddled }) => {
                if straddled {
                    self.stats.partial_packets += 1;
                }
                let Some(action) = window.action.filter(|code| !code.is_empty()) else {
                    self.report(StreamError::new(ErrorKind::MissingActionCode, offset), true);
                    return Ok(());
                };
                self.stats.max_packet_size = self.stats.max_packet_size.max(bytes.len());
                let result = match self.handlers.get_mut(&action) {
                    Some(handler) => handler(&action, bytes),
                    None => match &mut self.default_handler {
                        Some(handler) => handler(&action, bytes),
                        None => {
                            tracing::trace!(action = %action, "no handler registered, packet dropped");
                            Ok(())
                        }
                    },
                };
                match result {
                    Ok(()) => {
                        self.stats.packets_processed += 1;
                        tracing::trace!(action = %action, size = bytes.len(), "packet dispatched");
                        self.maybe_progress();
                    }
                    Err(err) => {
                        let kind = ErrorKind::HandlerFailure {
                            action,
                            message: err.to_string(),
                        };
                        match self.policy {
                            FailurePolicy::Halt => return Err(kind),
                            FailurePolicy::Continue => {
                                self.report(StreamError::new(kind, offset), true);
                            }
                        }
                    }
                }
            }
            Some(Captured::Overflowed { size }) => {
                self.stats.partial_packets += 1;
                self.report(
                    StreamError::new(
                        ErrorKind::PacketTooLarge {
                            size,
                            limit: self.max_packet_bytes,
                        },
                        offset,
                    ),
                    true,
                );
            }
            None => {}
        }
        Ok(())
    }

    fn flush_batch(&mut self, batch: &NodeBatch, offset: u64) -> Result<(), ErrorKind> {
        self.stats.tree_batches += 1;
        let result = match &mut self.batch_handler {
            Some(handler) => handler(batch),
            None => Ok(()),
        };
        if let Err(err) = result {
            let kind = ErrorKind::BatchFlushFailure {
                message: err.to_string(),
            };
            match self.policy {
                FailurePolicy::Halt => return Err(kind),
                FailurePolicy::Continue => self.report(StreamError::new(kind, offset), true),
            }
        }
        Ok(())
    }

    // ---- reporting --------------------------------------------------------

    fn report(&mut self, err: StreamError, recovered: bool) {
        if recovered {
            tracing::warn!(error = %err, "recoverable actionpacket error");
        } else {
            tracing::error!(error = %err, "fatal actionpacket error");
        }
        if let Some(handler) = &mut self.error_handler {
            handler(&err, recovered);
        }
    }

    fn maybe_progress(&mut self) {
        if self.diagnostics && self.last_progress.elapsed() >= self.progress_interval {
            self.log_progress();
            self.last_progress = Instant::now();
        }
    }

    fn log_progress(&self) {
        tracing::debug!(
            bytes = self.stats.bytes_processed,
            packets = self.stats.packets_processed,
            partial = self.stats.partial_packets,
            batches = self.stats.tree_batches,
            pending_batch_bytes = self.batcher.pending_bytes(),
            "actionpacket progress"
        );
    }
}

/// Streaming, memory-bounded parser for actionpacket sequences.
///
/// See the [crate docs](crate) for the wire format and an end-to-end
/// example. Construction installs the protocol filters; handlers are
/// registered afterwards and survive [`reset`](Self::reset).
pub struct ActionPacketParser {
    splitter: JsonSplitter<Dispatch>,
    dispatch: Dispatch,
    options: ParserOptions,
}

impl Default for ActionPacketParser {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActionPacketParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionPacketParser")
            .field("splitter", &self.splitter)
            .field("in_packet_array", &self.dispatch.in_packet_array)
            .field("packet", &self.dispatch.packet)
            .field("in_tree", &self.dispatch.in_tree)
            .field("pending_batch", &self.dispatch.batcher.pending_count())
            .field("stats", &self.dispatch.stats)
            .finish_non_exhaustive()
    }
}

impl ActionPacketParser {
    /// Creates a parser with default options and no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ParserOptions::default())
    }

    /// Creates a parser with the given options and no handlers.
    #[must_use]
    pub fn with_options(options: ParserOptions) -> Self {
        let mut splitter = JsonSplitter::new(options.into());
        splitter.add_filter("<", Dispatch::on_document_start);
        splitter.add_filter(">", Dispatch::on_document_end);
        splitter.add_filter("E", Dispatch::on_error);
        splitter.add_filter("{[a", Dispatch::on_packet_array);
        splitter.add_filter("{[a{", Dispatch::on_packet);
        splitter.add_filter("{[a{a", Dispatch::on_action_code);
        splitter.add_filter("{[a{[t", Dispatch::on_tree);
        splitter.add_filter("{[a{[t{", Dispatch::on_node);
        splitter.add_filter("{sn", Dispatch::on_cursor);
        splitter.add_filter("{w", Dispatch::on_notify_url);
        Self {
            splitter,
            dispatch: Dispatch::new(&options),
            options,
        }
    }

    /// Feeds one chunk of the actionpacket document. Any unparsed suffix is
    /// retained internally; feed only new bytes next call.
    ///
    /// Returns the parse progress in bytes credited by this call: the
    /// running total over all calls reaches the input length exactly when
    /// the document ended in its top-level close, and stays strictly below
    /// it while the document is still open (a call completing bytes
    /// retained from earlier chunks may credit more than the chunk's own
    /// length). Fatal errors latch: every subsequent call returns the same
    /// error until [`reset`](Self::reset).
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Result<usize, StreamError> {
        let begun = Instant::now();
        let result = self.splitter.process_chunk(&mut self.dispatch, chunk);
        self.dispatch.stats.total_processing_time += begun.elapsed();
        match result {
            Ok(consumed) => {
                self.dispatch.stats.bytes_processed += chunk.len() as u64;
                let in_use = self.splitter.retained_bytes() + self.dispatch.batcher.pending_bytes();
                self.dispatch.stats.peak_memory = self.dispatch.stats.peak_memory.max(in_use);
                self.dispatch.maybe_progress();
                Ok(consumed)
            }
            Err(err) => {
                if !self.dispatch.fatal_reported {
                    self.dispatch.fatal_reported = true;
                    self.dispatch.report(err.clone(), false);
                }
                Err(err)
            }
        }
    }

    /// Registers the handler for one action code, replacing any previous
    /// registration. Handlers survive `reset`; rebind only between
    /// `process_chunk` calls.
    pub fn set_packet_handler<F>(&mut self, action: impl Into<String>, handler: F)
    where
        F: FnMut(&str, &[u8]) -> Result<(), HandlerError> + 'static,
    {
        self.dispatch
            .handlers
            .insert(action.into(), Box::new(handler));
    }

    /// Registers the catch-all for action codes without their own handler.
    /// Without one, unmatched packets are counted and dropped silently.
    pub fn set_default_packet_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&str, &[u8]) -> Result<(), HandlerError> + 'static,
    {
        self.dispatch.default_handler = Some(Box::new(handler));
    }

    /// Registers the consumer for tree-element node batches.
    pub fn set_node_batch_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&NodeBatch) -> Result<(), HandlerError> + 'static,
    {
        self.dispatch.batch_handler = Some(Box::new(handler));
    }

    /// Registers the error observer: `(error, recovered)`. Called
    /// synchronously for every error; it cannot itself abort parsing.
    pub fn set_error_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&StreamError, bool) + 'static,
    {
        self.dispatch.error_handler = Some(Box::new(handler));
    }

    /// A value snapshot of the current statistics.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.dispatch.stats.clone()
    }

    /// Clears all parse state and statistics. Options and handlers survive.
    pub fn reset(&mut self) {
        self.splitter.reset();
        self.dispatch.reset();
    }

    /// Whether a fatal error has latched.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.splitter.has_failed()
    }

    /// The latched fatal error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&StreamError> {
        self.splitter.last_error()
    }

    /// Whether the top-level document has closed cleanly.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.splitter.has_finished()
    }

    /// The current configuration.
    #[must_use]
    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Replaces the configuration; effective immediately. Call between
    /// `process_chunk` calls only.
    pub fn set_options(&mut self, options: ParserOptions) {
        self.options = options;
        self.splitter.set_options(options.into());
        self.dispatch.apply_options(&options);
    }

    /// The last stream cursor (`sn`) observed, if any.
    #[must_use]
    pub fn cursor(&self) -> Option<&str> {
        self.dispatch.cursor.as_deref()
    }

    /// The last notification URL (`w`) observed, if any.
    #[must_use]
    pub fn notify_url(&self) -> Option<&str> {
        self.dispatch.notify_url.as_deref()
    }
}
