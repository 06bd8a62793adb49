use thiserror::Error;

/// Boxed error type returned by packet and node-batch handlers.
///
/// Handlers report failure with whatever error type they like; the parser
/// only records the message and applies the configured
/// [`FailurePolicy`](crate::FailurePolicy).
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error observed while processing the actionpacket stream.
///
/// `offset` is the byte position in the logical input stream, counted across
/// every chunk fed since construction or the last `reset`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at byte {offset}")]
pub struct StreamError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Byte position in the logical input stream.
    pub offset: u64,
}

impl StreamError {
    pub(crate) fn new(kind: ErrorKind, offset: u64) -> Self {
        Self { kind, offset }
    }
}

/// The failure classes surfaced by the parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Malformed JSON token. Fatal; requires `reset`.
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxErrorKind),

    /// Well-formed tokens in an impossible arrangement (unexpected close,
    /// nesting overflow, trailing data). Fatal; requires `reset`.
    #[error("structural error: {0}")]
    Structure(&'static str),

    /// An actionpacket without an `a` field, or with an empty action code.
    /// The packet is dropped and parsing continues.
    #[error("actionpacket carries no action code")]
    MissingActionCode,

    /// A packet (or tree descriptor) window outgrew its byte cap. The
    /// offending value is dropped and parsing continues.
    #[error("packet of {size} bytes exceeds the {limit} byte cap")]
    PacketTooLarge {
        /// The window's size when it was dropped.
        size: usize,
        /// The configured cap.
        limit: usize,
    },

    /// The retained buffer outgrew its byte cap. Fatal; the buffer is
    /// discarded and the stream must be restarted.
    #[error("retained buffer of {size} bytes exceeds the {limit} byte cap")]
    BufferOverrun {
        /// The buffer size the stream would have required.
        size: usize,
        /// The configured cap.
        limit: usize,
    },

    /// A packet handler returned an error.
    #[error("handler for action {action:?} failed: {message}")]
    HandlerFailure {
        /// The packet's action code.
        action: String,
        /// The handler's error, stringified.
        message: String,
    },

    /// The node-batch handler returned an error.
    #[error("node batch handler failed: {message}")]
    BatchFlushFailure {
        /// The handler's error, stringified.
        message: String,
    },
}

/// Scanner-level failures, wrapped by [`ErrorKind::Syntax`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SyntaxErrorKind {
    /// A byte that cannot start or continue any token.
    #[error("unexpected byte 0x{0:02x}")]
    UnexpectedByte(u8),
    /// A well-formed token in a position the grammar does not allow.
    #[error("unexpected {0}")]
    UnexpectedToken(&'static str),
    /// A backslash followed by a byte that is not a JSON escape.
    #[error("invalid escape byte 0x{0:02x}")]
    InvalidEscape(u8),
    /// `\u` not followed by four hex digits.
    #[error("invalid unicode escape sequence")]
    InvalidUnicodeEscape,
    /// A raw control byte inside a string literal.
    #[error("unescaped control byte 0x{0:02x} inside string")]
    ControlInString(u8),
    /// A number with a missing digit run (`1.`, `-`, `2e+`).
    #[error("malformed number")]
    MalformedNumber,
}
