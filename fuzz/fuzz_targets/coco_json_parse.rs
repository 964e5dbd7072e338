//! Fuzz target for COCO JSON parsing.
//!
//! Feeds arbitrary bytes to the COCO reader, including the id lookups that
//! attach annotations to images and categories.
//!
//! Run with:
//!   cargo +nightly fuzz run coco_json_parse

#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use unilabel::ir::io_coco_json::from_coco_slice;

fuzz_target!(|data: &[u8]| {
    // 10MB is generous for one annotation file.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = from_coco_slice(data, Path::new("images"));
});
