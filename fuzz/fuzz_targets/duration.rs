//! Fuzz target for duration parsing.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_duration
//! ```

#![no_main]

use columnar_query::duration::{format_duration, parse_duration};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(duration) = parse_duration(input) {
            // Whatever parses must survive a format/parse cycle.
            let rendered = format_duration(duration);
            assert_eq!(parse_duration(&rendered), Ok(duration), "{rendered}");
        }
    }
});
