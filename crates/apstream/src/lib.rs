//! Streaming, memory-bounded parsing of actionpacket sequences.
//!
//! A cloud-sync client receives server-to-client change notifications as
//! one large JSON document delivered in HTTP chunks. The document can run
//! to hundreds of megabytes for a large account, so it must never be
//! buffered whole.
//! This crate parses that document incrementally: feed each chunk as it
//! arrives and registered handlers see one actionpacket at a time, with
//! large tree (`t`) elements sliced into bounded node batches.
//!
//! The wire format is `{"a":[<packet>,...],"sn":"<cursor>",...}` where each
//! packet is a JSON object whose `a` field holds its action code. Packet
//! payloads are opaque here; handlers receive the packet's exact input
//! bytes and interpret them however they like.
//!
//! ```
//! use apstream::ActionPacketParser;
//!
//! let mut parser = ActionPacketParser::new();
//! parser.set_packet_handler("u", |_code, raw| {
//!     assert_eq!(raw, br#"{"a":"u","n":"AAAA"}"#);
//!     Ok(())
//! });
//!
//! // Chunk boundaries may fall anywhere, even inside a token.
//! parser.process_chunk(br#"{"a":[{"a":"u","n":"AA"#)?;
//! parser.process_chunk(br#"AA"}],"sn":"cursor01"}"#)?;
//!
//! assert!(parser.is_finished());
//! assert_eq!(parser.stats().packets_processed, 1);
//! assert_eq!(parser.cursor(), Some("cursor01"));
//! # Ok::<(), apstream::StreamError>(())
//! ```
//!
//! Two layers are exposed: [`ActionPacketParser`], the protocol-aware
//! dispatcher most hosts want, and [`JsonSplitter`], the generic
//! path-filtered splitter underneath it, reusable for other chunked JSON
//! surfaces.
//!
//! The parser is a pure library: no I/O, no threads, no persisted state.
//! It never retains pointers into a fed chunk past the call; carry-over is
//! copied into an internal buffer whose size is capped by configuration.

mod dispatcher;
mod error;
mod options;
pub mod splitter;

#[cfg(test)]
mod tests;

pub use dispatcher::{ActionPacketParser, NodeBatch, Stats};
pub use error::{ErrorKind, HandlerError, StreamError, SyntaxErrorKind};
pub use options::{FailurePolicy, ParserOptions, SplitterOptions};
pub use splitter::{
    Captured, ContainerKind, FilterAction, FilterCx, FilterEvent, JsonSplitter, ScalarView,
};
