//! Fuzz target for the JSON form of the inclusion directive.
//!
//! Feeds arbitrary JSON documents to `IncludeTree::from_json` to find
//! crashes and panics on malformed nesting.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_directive_json
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use sideload::IncludeTree;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(input) else {
        return;
    };
    // Construction must reject invalid nesting with an error, never panic.
    let _ = IncludeTree::from_json(&value);
});
