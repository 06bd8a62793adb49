//! Chunking-transparency fuzzing: whatever the input and however it is
//! partitioned, the parser must not panic, and for inputs it accepts the
//! emissions must match a single-chunk run byte for byte.

#![no_main]

use std::cell::RefCell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use apstream::{ActionPacketParser, ParserOptions};

#[derive(Debug, Arbitrary)]
struct Case {
    data: Vec<u8>,
    splits: Vec<u8>,
}

type Record = Rc<RefCell<(Vec<(String, Vec<u8>)>, Vec<Vec<Vec<u8>>>)>>;

fn parser_with_record() -> (ActionPacketParser, Record) {
    let record = Record::default();
    let mut parser = ActionPacketParser::with_options(ParserOptions {
        max_batch_count: 2,
        ..ParserOptions::default()
    });
    {
        let record = Rc::clone(&record);
        parser.set_default_packet_handler(move |code, raw| {
            record.borrow_mut().0.push((code.to_owned(), raw.to_vec()));
            Ok(())
        });
    }
    {
        let record = Rc::clone(&record);
        parser.set_node_batch_handler(move |batch| {
            record
                .borrow_mut()
                .1
                .push(batch.descriptors().map(<[u8]>::to_vec).collect());
            Ok(())
        });
    }
    (parser, record)
}

fuzz_target!(|case: Case| {
    let (mut whole, whole_record) = parser_with_record();
    let whole_result = whole.process_chunk(&case.data).is_ok();

    let (mut split, split_record) = parser_with_record();
    let mut fed = 0;
    let mut split_result = true;
    for &s in &case.splits {
        if fed == case.data.len() {
            break;
        }
        let take = 1 + usize::from(s) % (case.data.len() - fed);
        split_result &= split.process_chunk(&case.data[fed..fed + take]).is_ok();
        if !split_result {
            break;
        }
        fed += take;
    }
    if split_result && fed < case.data.len() {
        split_result &= split.process_chunk(&case.data[fed..]).is_ok();
    }

    // Emissions up to the first fatal error must agree; on fully accepted
    // input everything must agree.
    if whole_result && split_result {
        assert_eq!(*whole_record.borrow(), *split_record.borrow());
        assert_eq!(whole.is_finished(), split.is_finished());
    }
});
