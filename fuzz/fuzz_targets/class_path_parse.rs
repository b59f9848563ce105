//! Fuzz target for classification name parsing.
//!
//! A path that parses must format back to a string that parses to the
//! same path.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pathmirror::taxonomy::ClassPath;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(path) = ClassPath::parse(text) {
        let again = ClassPath::parse(&path.to_string()).expect("formatted path must parse");
        assert_eq!(again, path);
    }
});
