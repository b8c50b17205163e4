//! Fuzz target for the connection string parser and option resolution.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_connection_string
//! ```

#![no_main]

use columnar_cluster::{ClusterConfig, ClusterOptions, ConnectionString};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing and resolving only ever return errors.
        if let Ok(conn) = ConnectionString::parse(input) {
            let _ = conn.srv_record_name();
            let _ = ClusterConfig::resolve(&conn, &ClusterOptions::new());
        }
    }
});
