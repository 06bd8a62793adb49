//! Filter-level tests for the generic splitter.

use crate::error::ErrorKind;
use crate::options::SplitterOptions;
use crate::splitter::{Captured, FilterAction, FilterCx, FilterEvent, JsonSplitter};

/// Sink collecting one line per observed filter event.
#[derive(Default)]
struct Log {
    lines: Vec<String>,
}

impl Log {
    fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}

fn splitter() -> JsonSplitter<Log> {
    JsonSplitter::new(SplitterOptions::default())
}

/// Installs a capture filter at `path` that records delivered windows.
fn capture_at(s: &mut JsonSplitter<Log>, path: &str) {
    s.add_filter(path, |log: &mut Log, cx: &FilterCx<'_>| match cx.event {
        FilterEvent::ContainerOpen { .. } => Ok(FilterAction::Capture),
        FilterEvent::ContainerClose {
            captured: Some(Captured::Complete { bytes, straddled }),
            ..
        } => {
            log.push(format!("{straddled}:{}", String::from_utf8_lossy(bytes)));
            Ok(FilterAction::Continue)
        }
        FilterEvent::ContainerClose {
            captured: Some(Captured::Overflowed { .. }),
            ..
        } => {
            log.push("overflowed");
            Ok(FilterAction::Continue)
        }
        _ => Ok(FilterAction::Continue),
    });
}

#[test]
fn reserved_filters_frame_the_document() {
    let mut s = splitter();
    s.add_filter("<", |log: &mut Log, _cx: &FilterCx<'_>| {
        log.push("start");
        Ok(FilterAction::Continue)
    });
    s.add_filter(">", |log: &mut Log, _cx: &FilterCx<'_>| {
        log.push("end");
        Ok(FilterAction::Continue)
    });
    let mut log = Log::default();
    s.process_chunk(&mut log, b"  {\"x\":1}").unwrap();
    assert_eq!(log.lines, ["start", "end"]);
    assert!(s.has_finished());
    assert!(!s.has_failed());
}

#[test]
fn scalar_filter_matches_exact_path_only() {
    let mut s = splitter();
    s.add_filter("{sn", |log: &mut Log, cx: &FilterCx<'_>| {
        if let FilterEvent::Scalar(scalar) = cx.event {
            log.push(format!("sn={}", scalar.decode().unwrap()));
        }
        Ok(FilterAction::Continue)
    });
    let mut log = Log::default();
    s.process_chunk(&mut log, br#"{"x":{"sn":"inner"},"sn":"abc"}"#)
        .unwrap();
    // the nested object's sn renders as `{{xsn`, not `{sn`
    assert_eq!(log.lines, ["sn=abc"]);
}

#[test]
fn capture_delivers_exact_bytes_across_chunks() {
    let mut s = splitter();
    capture_at(&mut s, "{[a{");
    let mut log = Log::default();
    let doc = br#"{"a":[{"a":"u","n":1},{"a":"c"}]}"#;
    // split inside the first packet object
    s.process_chunk(&mut log, &doc[..14]).unwrap();
    s.process_chunk(&mut log, &doc[14..]).unwrap();
    assert_eq!(
        log.lines,
        [r#"true:{"a":"u","n":1}"#, r#"false:{"a":"c"}"#]
    );
    assert!(s.has_finished());
}

#[test]
fn single_byte_chunks_deliver_the_same_windows() {
    let mut s = splitter();
    capture_at(&mut s, "{[a{");
    let mut log = Log::default();
    let doc = br#"{"a":[{"a":"u","n":1}]}"#;
    for byte in doc {
        s.process_chunk(&mut log, std::slice::from_ref(byte)).unwrap();
    }
    assert_eq!(log.lines, [r#"true:{"a":"u","n":1}"#]);
}

#[test]
fn skip_value_suppresses_nested_filters() {
    let mut s = splitter();
    s.add_filter("{[skip", |log: &mut Log, cx: &FilterCx<'_>| match cx.event {
        FilterEvent::ContainerOpen { .. } => {
            log.push("skip-open");
            Ok(FilterAction::SkipValue)
        }
        _ => Ok(FilterAction::Continue),
    });
    s.add_filter("{[skip{", |log: &mut Log, _cx: &FilterCx<'_>| {
        log.push("inner fired");
        Ok(FilterAction::Continue)
    });
    s.add_filter("{after", |log: &mut Log, cx: &FilterCx<'_>| {
        if let FilterEvent::Scalar(scalar) = cx.event {
            if let crate::splitter::ScalarView::Num(raw) = scalar {
                log.push(format!("after={}", String::from_utf8_lossy(raw)));
            }
        }
        Ok(FilterAction::Continue)
    });
    let mut log = Log::default();
    s.process_chunk(&mut log, br#"{"skip":[{"x":1},2],"after":7}"#)
        .unwrap();
    assert_eq!(log.lines, ["skip-open", "after=7"]);
    assert!(s.has_finished());
}

#[test]
fn filter_abort_latches_until_reset() {
    let mut s = splitter();
    s.add_filter("{bad", |_log: &mut Log, _cx: &FilterCx<'_>| {
        Err(ErrorKind::Structure("rejected"))
    });
    let mut log = Log::default();
    let err = s
        .process_chunk(&mut log, br#"{"bad":1,"good":2}"#)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Structure("rejected"));
    assert!(s.has_failed());
    assert_eq!(s.last_error(), Some(&err));

    let again = s.process_chunk(&mut log, b"{}").unwrap_err();
    assert_eq!(again, err);

    s.reset();
    assert!(!s.has_failed());
    s.process_chunk(&mut log, b"{}").unwrap();
    assert!(s.has_finished());
}

#[test]
fn capture_overflow_releases_the_window() {
    let mut s: JsonSplitter<Log> = JsonSplitter::new(SplitterOptions {
        max_capture_bytes: 16,
        ..SplitterOptions::default()
    });
    capture_at(&mut s, "{[a{");
    let mut log = Log::default();
    s.process_chunk(&mut log, br#"{"a":[{"a":"u","pad":"xxxxxxxxxx"},{"a":"c"}]}"#)
        .unwrap();
    assert_eq!(log.lines, ["overflowed", r#"false:{"a":"c"}"#]);
    assert!(s.has_finished());
}

#[test]
fn error_filter_can_resync_to_the_next_element() {
    let mut s = splitter();
    s.add_filter("E", |log: &mut Log, _cx: &FilterCx<'_>| {
        log.push("error");
        Ok(FilterAction::SkipValue)
    });
    capture_at(&mut s, "{[a{");
    let mut log = Log::default();
    s.process_chunk(&mut log, br#"{"a":[{"a":!bad},{"a":"c"}]}"#)
        .unwrap();
    // the malformed packet's window is released, the next one is intact
    assert_eq!(log.lines, ["error", "overflowed", r#"false:{"a":"c"}"#]);
    assert!(s.has_finished());
    assert!(!s.has_failed());
}

#[test]
fn trailing_data_is_a_structural_error() {
    let mut s = splitter();
    let mut log = Log::default();
    let err = s.process_chunk(&mut log, b"{} {}").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Structure("trailing data"));
}

#[test]
fn consumed_counts_lag_an_open_document() {
    let mut s = splitter();
    let mut log = Log::default();
    let doc = br#"{"x":"ab","y":1}"#;
    // split inside the string: the residue stays uncredited
    let first = s.process_chunk(&mut log, &doc[..8]).unwrap();
    assert!(first < 8);
    let second = s.process_chunk(&mut log, &doc[8..]).unwrap();
    assert_eq!(first + second, doc.len());
    assert!(s.has_finished());
}

#[test]
fn truncated_document_never_reaches_full_credit() {
    let mut s = splitter();
    let mut log = Log::default();
    let doc = br#"{"a":["#;
    let consumed = s.process_chunk(&mut log, doc).unwrap();
    assert!(consumed < doc.len());
    assert!(!s.has_finished());
}

#[test]
fn trailing_whitespace_is_not_credited_as_document() {
    let mut s = splitter();
    let mut log = Log::default();
    let doc = b"{\"x\":1} ";
    let consumed = s.process_chunk(&mut log, doc).unwrap();
    assert_eq!(consumed, doc.len() - 1);
    assert!(s.has_finished());
}

#[test]
fn empty_chunks_are_harmless() {
    let mut s = splitter();
    let mut log = Log::default();
    assert_eq!(s.process_chunk(&mut log, b""), Ok(0));
    s.process_chunk(&mut log, b"{\"x\":[1,2]}").unwrap();
    assert_eq!(s.process_chunk(&mut log, b""), Ok(0));
    assert!(s.has_finished());
}

#[test]
fn buffer_overrun_is_fatal_and_clears_the_tail() {
    let mut s: JsonSplitter<Log> = JsonSplitter::new(SplitterOptions {
        max_buffer_bytes: 8,
        ..SplitterOptions::default()
    });
    let mut log = Log::default();
    // the partial string is retained; the next chunk would exceed the cap
    s.process_chunk(&mut log, br#"{"x":"ab"#).unwrap();
    let err = s.process_chunk(&mut log, b"cdefghij").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::BufferOverrun { .. }));
    assert_eq!(s.retained_bytes(), 0);
}
