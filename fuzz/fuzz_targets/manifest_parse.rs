//! Fuzz target for project manifest parsing.
//!
//! This fuzzer feeds arbitrary byte sequences to the manifest parser,
//! checking for panics, crashes, or hangs.

#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use pathmirror::project::manifest::from_manifest_slice;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = from_manifest_slice(data, Path::new("project.qpproj"));
});
