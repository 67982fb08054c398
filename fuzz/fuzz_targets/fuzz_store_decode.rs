//! Fuzz target: `store::decode`
//!
//! Feeds arbitrary file images to the store decoder. It must never panic,
//! and anything it accepts must carry a valid CRC trailer.
//!
//! cargo fuzz run fuzz_store_decode

#![no_main]

use cwa_sensor::frame::CRC32;
use cwa_sensor::store::decode;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if decode(data).is_ok() {
        let (body, trailer) = data.split_at(data.len() - 4);
        let crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        assert_eq!(CRC32.checksum(body), crc, "accepted image with bad trailer");
    }
});
