//! Current-path tracking for filter matching.
//!
//! The path is kept two ways at once: a stack of container frames (the
//! source of truth for nesting) and a flat rendered form used for exact
//! filter matching. The rendered form concatenates one segment per open
//! container (its mark, `{` or `[`, followed by the member key it hangs
//! under, if any) plus the innermost object's pending key while one is
//! set. `{[a{[t` therefore reads: object, array under key `a`, object,
//! array under key `t`.
//!
//! Keeping both in step is cheap because every transition is an append, an
//! insert at a recorded offset, or a truncation:
//!
//! - a container opening under a pending key inserts its mark *before*
//!   that key (`{a` becomes `{[a`), and the key is consumed by the close;
//! - a pending key appends at the innermost object's base (`{` plus `sn`
//!   is `{sn`, the form scalar filters match);
//! - closes and key changes truncate back to recorded offsets.
//!
//! Keys are matched by their raw bytes, escapes intact; the wire format's
//! filterable keys are short plain ASCII.

use bstr::BStr;

use crate::splitter::ContainerKind;

#[derive(Debug, Clone, Copy)]
struct Frame {
    kind: ContainerKind,
    /// Rendered length to restore when this container closes.
    restore_len: usize,
    /// Rendered length right past this container's segment; pending keys
    /// live in `base_len..`.
    base_len: usize,
    pending_key: bool,
}

#[derive(Debug, Default)]
pub(crate) struct PathTracker {
    rendered: Vec<u8>,
    frames: Vec<Frame>,
}

impl PathTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The canonical rendered path used for filter matching.
    pub fn render(&self) -> &[u8] {
        &self.rendered
    }

    pub fn as_bstr(&self) -> &BStr {
        BStr::new(&self.rendered)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top_kind(&self) -> Option<ContainerKind> {
        self.frames.last().map(|f| f.kind)
    }

    pub fn in_object(&self) -> bool {
        self.top_kind() == Some(ContainerKind::Object)
    }

    pub fn open(&mut self, kind: ContainerKind) {
        let mark = match kind {
            ContainerKind::Object => b'{',
            ContainerKind::Array => b'[',
        };
        let (restore_len, base_len) = match self.frames.last() {
            Some(parent) if parent.pending_key => {
                self.rendered.insert(parent.base_len, mark);
                (parent.base_len, self.rendered.len())
            }
            _ => {
                self.rendered.push(mark);
                (self.rendered.len() - 1, self.rendered.len())
            }
        };
        self.frames.push(Frame {
            kind,
            restore_len,
            base_len,
            pending_key: false,
        });
    }

    /// Pops the innermost container, consuming the parent's pending key.
    pub fn close(&mut self) -> Option<ContainerKind> {
        let frame = self.frames.pop()?;
        self.rendered.truncate(frame.restore_len);
        if let Some(parent) = self.frames.last_mut() {
            parent.pending_key = false;
        }
        Some(frame.kind)
    }

    /// Sets the innermost object's member key (raw bytes, escapes intact).
    pub fn set_key(&mut self, key: &[u8]) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        debug_assert_eq!(frame.kind, ContainerKind::Object);
        self.rendered.truncate(frame.base_len);
        self.rendered.extend_from_slice(key);
        frame.pending_key = true;
    }

    /// Clears the pending key, as on a comma between object members.
    pub fn clear_key(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            if frame.pending_key {
                self.rendered.truncate(frame.base_len);
                frame.pending_key = false;
            }
        }
    }

    pub fn clear(&mut self) {
        self.rendered.clear();
        self.frames.clear();
    }
}
