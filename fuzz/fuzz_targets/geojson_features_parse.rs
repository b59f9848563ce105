//! Fuzz target for GeoJSON feature parsing.
//!
//! Covers feature validation and geometry decoding; no objects are created.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pathmirror::hierarchy::parse_features_for_fuzzing;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = parse_features_for_fuzzing(data);
});
