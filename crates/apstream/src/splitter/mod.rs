//! Path-filtered streaming JSON splitter.
//!
//! [`JsonSplitter`] walks a JSON byte stream fed in arbitrary chunks and
//! invokes callbacks at registered structural positions instead of building
//! a DOM. Filters are keyed by the canonical path rendering maintained by
//! the path tracker (`{[a{` means object, array under key `a`, object);
//! three reserved names
//! complete the table: `<` fires once on the first non-whitespace input,
//! `>` once when the top-level value closes, and `E` on a parse error.
//!
//! A filter may ask the splitter to [`Capture`](FilterAction::Capture) the
//! container it just saw open: the splitter then holds the underlying bytes
//! back from the retained-tail buffer and hands the complete raw subtree,
//! braces included and byte-for-byte as received, to the same filter when
//! the container closes. The span is borrowed from the current parse view; it
//! is only ever copied as a side effect of chunk carry-over, and a window
//! that outgrows the configured cap is delivered as
//! [`Captured::Overflowed`] instead while parsing continues.
//!
//! The splitter is synchronous and single-owner: all state mutation happens
//! inside [`process_chunk`](JsonSplitter::process_chunk), which consumes as
//! much of the chunk as it can, retains the unparsed suffix internally, and
//! returns the parse progress in bytes; the running total reaches the
//! input length exactly when the top-level value closes. Fatal errors
//! latch: subsequent calls return the same error until
//! [`reset`](JsonSplitter::reset).

mod byte_buffer;
pub(crate) mod path;
pub(crate) mod scanner;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use bstr::BStr;

use crate::error::{ErrorKind, StreamError, SyntaxErrorKind};
use crate::options::SplitterOptions;
use byte_buffer::ByteBuffer;
use path::PathTracker;
use scanner::{Lexeme, Scan, Token, scan};

/// The two JSON container kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// `{` … `}`
    Object,
    /// `[` … `]`
    Array,
}

/// A scalar value observed at a filtered path. Spans borrow from the parse
/// view and are valid only for the duration of the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarView<'a> {
    /// A string scalar.
    Str {
        /// Raw span between the quotes, escapes intact.
        raw: &'a [u8],
        /// Whether `raw` contains at least one backslash escape.
        had_escape: bool,
    },
    /// Raw number span; no numeric conversion.
    Num(&'a [u8]),
    /// `true` or `false`.
    Bool(bool),
    /// `null`.
    Null,
}

impl<'a> ScalarView<'a> {
    /// Decodes a string scalar to text; `None` for non-strings.
    pub fn decode(&self) -> Option<Cow<'a, str>> {
        match *self {
            ScalarView::Str { raw, had_escape } => Some(if had_escape {
                scanner::unescape(raw)
            } else {
                String::from_utf8_lossy(raw)
            }),
            _ => None,
        }
    }
}

/// The outcome of a capture window, delivered on container close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Captured<'a> {
    /// The window closed within the cap.
    Complete {
        /// The subtree's exact input bytes, braces included.
        bytes: &'a [u8],
        /// Whether the window crossed at least one chunk boundary and was
        /// staged in the retained buffer.
        straddled: bool,
    },
    /// The window outgrew the configured cap; its bytes were released.
    Overflowed {
        /// The window's size at close, in bytes.
        size: usize,
    },
}

/// What the splitter should do after a filter callback returns.
///
/// Aborting is expressed through the callback's `Err` arm: the splitter
/// latches the returned [`ErrorKind`] at the event's offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    /// Keep emitting events normally.
    Continue,
    /// On a container open: hold the subtree's bytes and deliver them with
    /// the matching close event. Ignored elsewhere.
    Capture,
    /// On a container open: silently consume the balanced subtree without
    /// firing nested filters. On an `E` event: drop input through the next
    /// comma at the error's nesting level and resume (best-effort resync).
    /// Ignored elsewhere.
    SkipValue,
}

/// The event driving a filter invocation.
#[derive(Debug, Clone, Copy)]
pub enum FilterEvent<'a> {
    /// Reserved filter `<`: first non-whitespace input.
    DocumentStart,
    /// Reserved filter `>`: the top-level value closed.
    DocumentEnd,
    /// A container opened at the filter's path.
    ContainerOpen {
        /// The container that opened.
        kind: ContainerKind,
    },
    /// The container at the filter's path closed.
    ContainerClose {
        /// The container that closed.
        kind: ContainerKind,
        /// Present iff this filter requested [`FilterAction::Capture`] on
        /// the matching open.
        captured: Option<Captured<'a>>,
    },
    /// A scalar value sits at the filter's path.
    Scalar(ScalarView<'a>),
    /// Reserved filter `E`: a fatal parse error is about to latch.
    ParseError(&'a StreamError),
}

/// Context handed to a filter callback.
#[derive(Debug)]
pub struct FilterCx<'a> {
    /// Canonical path at the event (the reserved name for `<`, `>`, `E`).
    pub path: &'a BStr,
    /// What happened at that path.
    pub event: FilterEvent<'a>,
    /// Logical byte offset of the event's token start.
    pub offset: u64,
}

type Filter<S> = Box<dyn FnMut(&mut S, &FilterCx<'_>) -> Result<FilterAction, ErrorKind>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Ended,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// A value: top level, after a colon, or after an array comma.
    Value,
    /// A value or `]`, immediately after `[`.
    ValueOrClose,
    /// A member key or `}`, immediately after `{`.
    KeyOrClose,
    /// A member key, after an object comma.
    Key,
    /// The `:` between key and value.
    Colon,
    /// `,` or the containing close.
    AfterValue,
}

#[derive(Debug, Clone, Copy)]
struct Capture {
    /// Logical offset of the opening brace.
    start: u64,
    /// Frame depth of the captured container.
    depth: usize,
    straddled: bool,
    overflowed: bool,
}

#[derive(Debug, Clone, Copy)]
enum Skip {
    /// Consume a balanced subtree without firing filters; `depth` is the
    /// number of unclosed containers within the skip.
    Balanced { depth: usize },
    /// Raw post-error resync: drop bytes through the next comma at the
    /// error's nesting level, string-aware.
    Resync {
        delta: u32,
        in_string: bool,
        escaped: bool,
    },
}

/// A path-filtered streaming JSON splitter. See the module docs.
///
/// `S` is the sink threaded into every filter callback; it carries whatever
/// state the filters share.
pub struct JsonSplitter<S> {
    buffer: ByteBuffer,
    path: PathTracker,
    filters: HashMap<Vec<u8>, Filter<S>>,
    options: SplitterOptions,
    phase: Phase,
    expect: Expect,
    captures: Vec<Capture>,
    skip: Option<Skip>,
    error: Option<StreamError>,
    /// Parsed prefix length of the retained tail (bytes held back for a
    /// capture window have already been scanned; scanning resumes after
    /// them).
    resume: usize,
    /// Consumed-count ledger: logical bytes already credited to the caller.
    credited: u64,
}

impl<S> fmt::Debug for JsonSplitter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSplitter")
            .field("phase", &self.phase)
            .field("path", &self.path.as_bstr())
            .field("retained", &self.buffer.len())
            .field("captures", &self.captures.len())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<S> Default for JsonSplitter<S> {
    fn default() -> Self {
        Self::new(SplitterOptions::default())
    }
}

impl<S> JsonSplitter<S> {
    /// Creates a splitter with an empty filter table.
    #[must_use]
    pub fn new(options: SplitterOptions) -> Self {
        Self {
            buffer: ByteBuffer::new(),
            path: PathTracker::new(),
            filters: HashMap::new(),
            options,
            phase: Phase::Idle,
            expect: Expect::Value,
            captures: Vec::new(),
            skip: None,
            error: None,
            resume: 0,
            credited: 0,
        }
    }

    /// Registers a filter at a canonical path (or a reserved name). At most
    /// one filter fires per event; matching is exact, the table is flat.
    pub fn add_filter<P, F>(&mut self, path: P, filter: F)
    where
        P: Into<Vec<u8>>,
        F: FnMut(&mut S, &FilterCx<'_>) -> Result<FilterAction, ErrorKind> + 'static,
    {
        self.filters.insert(path.into(), Box::new(filter));
    }

    /// The current configuration.
    pub fn options(&self) -> &SplitterOptions {
        &self.options
    }

    /// Options may be replaced between `process_chunk` calls; updates take
    /// effect immediately.
    pub fn set_options(&mut self, options: SplitterOptions) {
        self.options = options;
    }

    /// Whether a fatal error has latched.
    pub fn has_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Whether the top-level value has closed cleanly.
    pub fn has_finished(&self) -> bool {
        self.phase == Phase::Ended
    }

    /// The latched fatal error, if any.
    pub fn last_error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    /// Bytes currently retained between calls (unparsed tail plus any
    /// held-back capture window).
    pub fn retained_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Clears all parse state. Filters and options survive.
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.path.clear();
        self.phase = Phase::Idle;
        self.expect = Expect::Value;
        self.captures.clear();
        self.skip = None;
        self.error = None;
        self.resume = 0;
        self.credited = 0;
    }

    /// Feeds one chunk, running as far as the input allows. The unparsed
    /// suffix is retained internally; feed only new bytes next call.
    ///
    /// Returns the parse progress in bytes credited by this call. The
    /// running total over all calls never exceeds the bytes fed, reaches it
    /// exactly when the input ends in the top-level value's close, and
    /// stays strictly below it otherwise: residue retained mid-token goes
    /// uncredited until it parses, and one byte of an open document is held
    /// in escrow until the document closes. A call that completes bytes
    /// retained from earlier calls may therefore credit more than the
    /// chunk's own length.
    ///
    /// Fatal errors latch and are returned by every subsequent call until
    /// [`reset`](Self::reset).
    pub fn process_chunk(&mut self, sink: &mut S, chunk: &[u8]) -> Result<usize, StreamError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let retained = self.buffer.len();
        if retained + chunk.len() > self.options.max_buffer_bytes {
            let kind = ErrorKind::BufferOverrun {
                size: retained + chunk.len(),
                limit: self.options.max_buffer_bytes,
            };
            let offset = self.buffer.base() + retained as u64;
            self.buffer.clear();
            self.resume = 0;
            return Err(self
                .fail(sink, kind, offset)
                .unwrap_or_else(|| StreamError::new(ErrorKind::Structure("overrun"), offset)));
        }

        let mut tail = self.buffer.take_tail();
        let joined = !tail.is_empty();
        if joined {
            tail.extend_from_slice(chunk);
        }
        let view: &[u8] = if joined { &tail } else { chunk };
        let base = self.buffer.base();
        let mut cursor = self.resume;

        let outcome = self.run(sink, view, base, &mut cursor);
        let total = view.len();

        if let Err(err) = outcome {
            // Absorbing state: abandon the view entirely.
            if joined {
                self.buffer.retain_owned(tail, total);
            } else {
                self.buffer.retain_copied(view, total);
            }
            self.resume = 0;
            return Err(err);
        }

        // Credit parse progress. While the document is still open, one byte
        // stays in escrow so the running total only reaches the input
        // length once the top-level value has closed.
        let parsed = base + cursor as u64;
        let target = if self.phase == Phase::Ended {
            parsed
        } else {
            parsed.saturating_sub(1)
        };
        let consumed = (target - self.credited) as usize;
        self.credited = target;

        // Anything surviving this call straddles a chunk boundary; hold the
        // outermost live capture window back from truncation.
        let mut keep = cursor;
        for capture in &mut self.captures {
            if !capture.overflowed {
                keep = keep.min((capture.start - base) as usize);
            }
            capture.straddled = true;
        }
        if joined {
            self.buffer.retain_owned(tail, keep);
        } else {
            self.buffer.retain_copied(view, keep);
        }
        self.resume = cursor - keep;
        Ok(consumed)
    }

    fn run(
        &mut self,
        sink: &mut S,
        view: &[u8],
        base: u64,
        cursor: &mut usize,
    ) -> Result<(), StreamError> {
        loop {
            if matches!(self.skip, Some(Skip::Resync { .. })) {
                if !self.resync(view, cursor) {
                    return Ok(());
                }
                continue;
            }

            let lexeme = match scan(&view[*cursor..]) {
                Scan::NeedMore => return Ok(()),
                Scan::Fail { kind, at } => {
                    let offset = base + (*cursor + at) as u64;
                    *cursor += at + 1;
                    match self.fail(sink, ErrorKind::Syntax(kind), offset) {
                        None => continue,
                        Some(err) => return Err(err),
                    }
                }
                Scan::Lexeme(lexeme) => Lexeme {
                    token: lexeme.token,
                    start: *cursor + lexeme.start,
                    end: *cursor + lexeme.end,
                },
            };
            *cursor = lexeme.end;
            let offset = base + lexeme.start as u64;

            if self.phase == Phase::Idle {
                self.phase = Phase::Running;
                if let Some(Err(kind)) =
                    Self::fire_reserved(&mut self.filters, sink, b"<", FilterEvent::DocumentStart, offset)
                {
                    if let Some(err) = self.fail(sink, kind, offset) {
                        return Err(err);
                    }
                    continue;
                }
            } else if self.phase == Phase::Ended {
                match self.fail(sink, ErrorKind::Structure("trailing data"), offset) {
                    None => continue,
                    Some(err) => return Err(err),
                }
            }

            if let Some(Skip::Balanced { depth }) = &mut self.skip {
                match lexeme.token {
                    Token::ObjectOpen | Token::ArrayOpen => *depth += 1,
                    Token::ObjectClose | Token::ArrayClose => {
                        *depth -= 1;
                        if *depth == 0 {
                            self.skip = None;
                            self.path.close();
                            self.value_done(sink, base + lexeme.end as u64)?;
                        }
                    }
                    _ => {}
                }
                self.mark_overflows(base, lexeme.end);
                continue;
            }

            self.step(sink, view, base, lexeme, offset)?;
            self.mark_overflows(base, lexeme.end);
        }
    }

    /// One state-machine transition for a single lexeme.
    fn step(
        &mut self,
        sink: &mut S,
        view: &[u8],
        base: u64,
        lexeme: Lexeme<'_>,
        offset: u64,
    ) -> Result<(), StreamError> {
        match self.expect {
            Expect::Value | Expect::ValueOrClose => match lexeme.token {
                Token::ObjectOpen => self.open_container(sink, ContainerKind::Object, offset),
                Token::ArrayOpen => self.open_container(sink, ContainerKind::Array, offset),
                Token::ArrayClose if self.expect == Expect::ValueOrClose => {
                    self.close_container(sink, view, base, lexeme.end, offset)
                }
                Token::Str { raw, had_escape } => {
                    self.scalar(sink, ScalarView::Str { raw, had_escape }, offset)
                }
                Token::Num(raw) => self.scalar(sink, ScalarView::Num(raw), offset),
                Token::Bool(value) => self.scalar(sink, ScalarView::Bool(value), offset),
                Token::Null => self.scalar(sink, ScalarView::Null, offset),
                other => self.unexpected(sink, other, offset),
            },
            Expect::KeyOrClose => match lexeme.token {
                Token::Str { raw, .. } => {
                    self.path.set_key(raw);
                    self.expect = Expect::Colon;
                    Ok(())
                }
                Token::ObjectClose => self.close_container(sink, view, base, lexeme.end, offset),
                other => self.unexpected(sink, other, offset),
            },
            Expect::Key => match lexeme.token {
                Token::Str { raw, .. } => {
                    self.path.set_key(raw);
                    self.expect = Expect::Colon;
                    Ok(())
                }
                other => self.unexpected(sink, other, offset),
            },
            Expect::Colon => match lexeme.token {
                Token::Colon => {
                    self.expect = Expect::Value;
                    Ok(())
                }
                other => self.unexpected(sink, other, offset),
            },
            Expect::AfterValue => match lexeme.token {
                Token::Comma => {
                    if self.path.in_object() {
                        self.path.clear_key();
                        self.expect = Expect::Key;
                    } else {
                        self.expect = Expect::Value;
                    }
                    Ok(())
                }
                Token::ObjectClose if self.path.in_object() => {
                    self.close_container(sink, view, base, lexeme.end, offset)
                }
                Token::ArrayClose if !self.path.in_object() && self.path.depth() > 0 => {
                    self.close_container(sink, view, base, lexeme.end, offset)
                }
                other => self.unexpected(sink, other, offset),
            },
        }
    }

    fn open_container(
        &mut self,
        sink: &mut S,
        kind: ContainerKind,
        offset: u64,
    ) -> Result<(), StreamError> {
        if self.path.depth() >= self.options.max_depth {
            return match self.fail(sink, ErrorKind::Structure("nesting overflow"), offset) {
                None => Ok(()),
                Some(err) => Err(err),
            };
        }
        self.path.open(kind);
        self.expect = match kind {
            ContainerKind::Object => Expect::KeyOrClose,
            ContainerKind::Array => Expect::ValueOrClose,
        };

        let action = {
            let rendered = self.path.render();
            match self.filters.get_mut(rendered) {
                Some(filter) => Some(filter(
                    sink,
                    &FilterCx {
                        path: BStr::new(rendered),
                        event: FilterEvent::ContainerOpen { kind },
                        offset,
                    },
                )),
                None => None,
            }
        };
        match action {
            Some(Ok(FilterAction::Capture)) => {
                self.captures.push(Capture {
                    start: offset,
                    depth: self.path.depth(),
                    straddled: false,
                    overflowed: false,
                });
                Ok(())
            }
            Some(Ok(FilterAction::SkipValue)) => {
                self.skip = Some(Skip::Balanced { depth: 1 });
                Ok(())
            }
            Some(Err(kind)) => match self.fail(sink, kind, offset) {
                None => Ok(()),
                Some(err) => Err(err),
            },
            Some(Ok(FilterAction::Continue)) | None => Ok(()),
        }
    }

    fn close_container(
        &mut self,
        sink: &mut S,
        view: &[u8],
        base: u64,
        end: usize,
        offset: u64,
    ) -> Result<(), StreamError> {
        let depth = self.path.depth();
        let Some(kind) = self.path.top_kind() else {
            return match self.fail(sink, ErrorKind::Structure("unexpected close"), offset) {
                None => Ok(()),
                Some(err) => Err(err),
            };
        };

        let captured = if self.captures.last().map(|c| c.depth) == Some(depth) {
            self.captures.pop().map(|capture| {
                let size = (base + end as u64 - capture.start) as usize;
                if capture.overflowed || size > self.options.max_capture_bytes {
                    Captured::Overflowed { size }
                } else {
                    let from = (capture.start - base) as usize;
                    Captured::Complete {
                        bytes: &view[from..end],
                        straddled: capture.straddled,
                    }
                }
            })
        } else {
            None
        };

        let action = {
            let rendered = self.path.render();
            match self.filters.get_mut(rendered) {
                Some(filter) => Some(filter(
                    sink,
                    &FilterCx {
                        path: BStr::new(rendered),
                        event: FilterEvent::ContainerClose { kind, captured },
                        offset,
                    },
                )),
                None => None,
            }
        };
        self.path.close();
        if let Some(Err(kind)) = action {
            return match self.fail(sink, kind, offset) {
                None => Ok(()),
                Some(err) => Err(err),
            };
        }
        self.value_done(sink, base + end as u64)
    }

    fn scalar(
        &mut self,
        sink: &mut S,
        value: ScalarView<'_>,
        offset: u64,
    ) -> Result<(), StreamError> {
        let action = {
            let rendered = self.path.render();
            match self.filters.get_mut(rendered) {
                Some(filter) => Some(filter(
                    sink,
                    &FilterCx {
                        path: BStr::new(rendered),
                        event: FilterEvent::Scalar(value),
                        offset,
                    },
                )),
                None => None,
            }
        };
        if let Some(Err(kind)) = action {
            return match self.fail(sink, kind, offset) {
                None => Ok(()),
                Some(err) => Err(err),
            };
        }
        self.value_done(sink, offset)
    }

    fn value_done(&mut self, sink: &mut S, offset: u64) -> Result<(), StreamError> {
        if self.path.depth() == 0 {
            self.phase = Phase::Ended;
            if let Some(Err(kind)) =
                Self::fire_reserved(&mut self.filters, sink, b">", FilterEvent::DocumentEnd, offset)
            {
                if let Some(err) = self.fail(sink, kind, offset) {
                    return Err(err);
                }
            }
        } else {
            self.expect = Expect::AfterValue;
        }
        Ok(())
    }

    fn unexpected(
        &mut self,
        sink: &mut S,
        token: Token<'_>,
        offset: u64,
    ) -> Result<(), StreamError> {
        let name = match token {
            Token::ObjectOpen => "'{'",
            Token::ObjectClose => "'}'",
            Token::ArrayOpen => "'['",
            Token::ArrayClose => "']'",
            Token::Colon => "':'",
            Token::Comma => "','",
            Token::Str { .. } => "string",
            Token::Num(_) => "number",
            Token::Bool(_) | Token::Null => "literal",
        };
        match self.fail(
            sink,
            ErrorKind::Syntax(SyntaxErrorKind::UnexpectedToken(name)),
            offset,
        ) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    fn fire_reserved(
        filters: &mut HashMap<Vec<u8>, Filter<S>>,
        sink: &mut S,
        name: &[u8],
        event: FilterEvent<'_>,
        offset: u64,
    ) -> Option<Result<FilterAction, ErrorKind>> {
        let filter = filters.get_mut(name)?;
        Some(filter(
            sink,
            &FilterCx {
                path: BStr::new(name),
                event,
                offset,
            },
        ))
    }

    /// Marks capture windows that outgrew the cap; their bytes are released
    /// at the next retention point and the close delivers `Overflowed`.
    fn mark_overflows(&mut self, base: u64, cursor_end: usize) {
        let limit = self.options.max_capture_bytes as u64;
        let stream_pos = base + cursor_end as u64;
        for capture in &mut self.captures {
            if !capture.overflowed && stream_pos - capture.start > limit {
                capture.overflowed = true;
            }
        }
    }

    /// Latches `kind` at `offset` unless the `E` filter elects to resync.
    ///
    /// Returns the latched error, or `None` if recovery is under way.
    fn fail(&mut self, sink: &mut S, kind: ErrorKind, offset: u64) -> Option<StreamError> {
        let err = StreamError::new(kind, offset);
        let skippable = matches!(
            err.kind,
            ErrorKind::Syntax(_) | ErrorKind::Structure(_)
        ) && self.path.depth() > 0;
        let action = {
            match self.filters.get_mut(b"E".as_slice()) {
                Some(filter) => Some(filter(
                    sink,
                    &FilterCx {
                        path: BStr::new(b"E"),
                        event: FilterEvent::ParseError(&err),
                        offset,
                    },
                )),
                None => None,
            }
        };
        if skippable && matches!(action, Some(Ok(FilterAction::SkipValue))) {
            tracing::warn!(error = %err, "recovering from parse error by resync");
            for capture in &mut self.captures {
                capture.overflowed = true;
            }
            self.path.clear_key();
            self.skip = Some(Skip::Resync {
                delta: 0,
                in_string: false,
                escaped: false,
            });
            return None;
        }
        self.phase = Phase::Failed;
        self.captures.clear();
        self.skip = None;
        self.error = Some(err.clone());
        Some(err)
    }

    /// Raw post-error resync. Returns `true` once normal scanning can
    /// resume, `false` when the view is exhausted.
    fn resync(&mut self, view: &[u8], cursor: &mut usize) -> bool {
        let Some(Skip::Resync {
            delta,
            in_string,
            escaped,
        }) = &mut self.skip
        else {
            return true;
        };
        while *cursor < view.len() {
            let byte = view[*cursor];
            *cursor += 1;
            if *in_string {
                if *escaped {
                    *escaped = false;
                } else if byte == b'\\' {
                    *escaped = true;
                } else if byte == b'"' {
                    *in_string = false;
                }
                continue;
            }
            match byte {
                b'"' => *in_string = true,
                b'{' | b'[' => *delta += 1,
                b'}' | b']' => {
                    if *delta == 0 {
                        // Let the enclosing close run through the normal path.
                        *cursor -= 1;
                        self.skip = None;
                        self.expect = Expect::AfterValue;
                        return true;
                    }
                    *delta -= 1;
                }
                b',' if *delta == 0 => {
                    self.skip = None;
                    self.expect = if self.path.in_object() {
                        Expect::Key
                    } else {
                        Expect::Value
                    };
                    return true;
                }
                _ => {}
            }
        }
        false
    }
}
