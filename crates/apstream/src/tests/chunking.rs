//! Chunking-transparency and determinism properties.
//!
//! However a document is partitioned into chunks, the emitted
//! `(action_code, packet_bytes)` sequence, the node-batch contents, and the
//! chunking-independent statistics must be identical.

use std::cell::RefCell;
use std::rc::Rc;

use quickcheck::QuickCheck;

use crate::{ActionPacketParser, ParserOptions, Stats};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Emissions {
    packets: Vec<(String, Vec<u8>)>,
    batches: Vec<Vec<Vec<u8>>>,
    recovered: Vec<String>,
}

/// Counters that must not depend on how the input was chunked.
/// (`partial_packets` and the time fields legitimately do.)
fn stable_counters(stats: &Stats) -> (u64, u64, u64, u64, usize) {
    (
        stats.bytes_processed,
        stats.packets_processed,
        stats.large_elements,
        stats.tree_batches,
        stats.max_packet_size,
    )
}

fn build_doc(specs: &[(String, String, Option<u8>)]) -> Vec<u8> {
    let mut doc = String::from("{\"a\":[");
    for (i, (action, payload, tree)) in specs.iter().enumerate() {
        if i > 0 {
            doc.push(',');
        }
        doc.push_str("{\"a\":");
        doc.push_str(&serde_json::to_string(action).unwrap());
        doc.push_str(",\"x\":");
        doc.push_str(&serde_json::to_string(payload).unwrap());
        if let Some(n) = tree {
            doc.push_str(",\"t\":[");
            for k in 0..(n % 7) {
                if k > 0 {
                    doc.push(',');
                }
                doc.push_str(&format!("{{\"h\":\"{k}\",\"p\":\"r\"}}"));
            }
            doc.push(']');
        }
        doc.push('}');
    }
    doc.push_str("],\"sn\":\"CURSOR01\"}");
    doc.into_bytes()
}

/// Feeds `doc` in the chunk sizes derived from `splits` (everything at once
/// when empty) and returns what came out.
fn run(doc: &[u8], splits: &[usize]) -> (Emissions, Stats, Option<String>) {
    let record = Rc::new(RefCell::new(Emissions::default()));
    let mut parser = ActionPacketParser::with_options(ParserOptions {
        max_batch_count: 3,
        ..ParserOptions::default()
    });
    {
        let record = Rc::clone(&record);
        parser.set_default_packet_handler(move |code, raw| {
            record
                .borrow_mut()
                .packets
                .push((code.to_owned(), raw.to_vec()));
            Ok(())
        });
    }
    {
        let record = Rc::clone(&record);
        parser.set_node_batch_handler(move |batch| {
            record
                .borrow_mut()
                .batches
                .push(batch.descriptors().map(<[u8]>::to_vec).collect());
            Ok(())
        });
    }
    {
        let record = Rc::clone(&record);
        parser.set_error_handler(move |err, recovered| {
            assert!(recovered, "no fatal errors expected: {err}");
            record.borrow_mut().recovered.push(err.to_string());
        });
    }

    let mut fed = 0;
    for &split in splits {
        if fed == doc.len() {
            break;
        }
        let take = 1 + split % (doc.len() - fed);
        parser.process_chunk(&doc[fed..fed + take]).unwrap();
        fed += take;
    }
    if fed < doc.len() {
        parser.process_chunk(&doc[fed..]).unwrap();
    }
    assert!(parser.is_finished());

    let emissions = record.borrow().clone();
    let cursor = parser.cursor().map(str::to_owned);
    (emissions, parser.stats(), cursor)
}

#[test]
fn chunk_partition_transparency_quickcheck() {
    fn prop(specs: Vec<(String, String, Option<u8>)>, splits: Vec<usize>) -> bool {
        let doc = build_doc(&specs);
        let (whole, whole_stats, whole_cursor) = run(&doc, &[]);
        let (split, split_stats, split_cursor) = run(&doc, &splits);
        whole == split
            && stable_counters(&whole_stats) == stable_counters(&split_stats)
            && whole_cursor == split_cursor
            && whole_cursor.as_deref() == Some("CURSOR01")
    }

    let tests = if is_ci::cached() { 2_000 } else { 200 };
    QuickCheck::new()
        .tests(tests)
        .quickcheck(prop as fn(Vec<(String, String, Option<u8>)>, Vec<usize>) -> bool);
}

/// `reset` followed by re-feeding the same input yields identical emissions
/// and identical (chunking-stable) statistics.
#[test]
fn reset_then_refeed_is_deterministic() {
    let doc = build_doc(&[
        ("u".into(), "payload".into(), None),
        ("t".into(), String::new(), Some(5)),
        ("c".into(), "x".into(), None),
    ]);

    let record = Rc::new(RefCell::new(Emissions::default()));
    let mut parser = ActionPacketParser::with_options(ParserOptions {
        max_batch_count: 2,
        ..ParserOptions::default()
    });
    {
        let record = Rc::clone(&record);
        parser.set_default_packet_handler(move |code, raw| {
            record
                .borrow_mut()
                .packets
                .push((code.to_owned(), raw.to_vec()));
            Ok(())
        });
    }
    {
        let record = Rc::clone(&record);
        parser.set_node_batch_handler(move |batch| {
            record
                .borrow_mut()
                .batches
                .push(batch.descriptors().map(<[u8]>::to_vec).collect());
            Ok(())
        });
    }

    parser.process_chunk(&doc).unwrap();
    let first = record.borrow().clone();
    let first_stats = parser.stats();
    record.borrow_mut().packets.clear();
    record.borrow_mut().batches.clear();

    parser.reset();
    assert_eq!(parser.stats().packets_processed, 0);
    parser.process_chunk(&doc).unwrap();
    let second = record.borrow().clone();

    assert_eq!(first, second);
    assert_eq!(
        stable_counters(&first_stats),
        stable_counters(&parser.stats())
    );
}
