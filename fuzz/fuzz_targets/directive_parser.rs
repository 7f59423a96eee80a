//! Fuzz target for the inclusion directive parser.
//!
//! This target feeds arbitrary strings to the directive parser to find
//! crashes and panics.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_directive_parser
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use sideload::IncludeTree;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // The parser should never panic, only return errors.
        if let Ok(tree) = IncludeTree::parse(input) {
            // A successfully parsed tree must be traversable.
            for name in tree.names() {
                let _ = tree.contains(name);
                let _ = tree.descend(name);
            }
        }
    }
});
