//! Fuzz target for LabelMe JSON parsing, including polygon reduction.

#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use unilabel::ir::io_labelme_json::from_labelme_str;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };

    let _ = from_labelme_str(json, Path::new("/nonexistent/fuzz.json"));
});
