//! Fuzz target for the incremental response scanner.
//!
//! The input is split at an arbitrary point so chunk boundaries land
//! anywhere inside tokens.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_response_scanner
//! ```

#![no_main]

use arbitrary::Arbitrary;
use columnar_cluster::ResponseScanner;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    split: usize,
    body: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let split = input.split % (input.body.len() + 1);
    let (head, tail) = input.body.split_at(split);

    let mut scanner = ResponseScanner::new();
    for chunk in [head, tail] {
        if scanner.feed(chunk).is_err() {
            return;
        }
        while scanner.pop_row().is_some() {}
    }
    if scanner.finish().is_ok() {
        let _ = scanner.metadata();
        let _ = scanner.errors();
    }
});
