//! Fuzz target: portal form scraping
//!
//! Runs the hidden-input scraper and meta-refresh finder over arbitrary
//! markup. Neither may panic (slicing is byte-offset based, so multi-byte
//! UTF-8 around the patterns is the interesting case), and the login body
//! always starts with the fixed fields.
//!
//! cargo fuzz run fuzz_form_scraper

#![no_main]

use cwa_sensor::portal::form::{
    build_form_body, find_meta_refresh, scrape_hidden_fields, FIXED_FIELDS,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(html) = std::str::from_utf8(data) else {
        return;
    };

    for (name, value) in scrape_hidden_fields(html) {
        assert!(!name.contains('"'));
        assert!(!value.contains('"'));
    }

    let body = build_form_body(html);
    assert!(body.starts_with(&FIXED_FIELDS.join("&")));

    if let Some(target) = find_meta_refresh(html) {
        assert!(!target.contains('"'));
    }
});
