//! Frame encoding.
//!
//! A frame is one wake's sample, big-endian:
//!
//! ```text
//! timestamp:i32 battery:u16 hall:i16 temperature:i16 wifi_count:u8 beacon_count:u8
//! wifi_count   × (mac:[u8;6] rssi:i8)
//! beacon_count × (id:[u8;20] rssi:i8)
//! ```
//!
//! Frames are stored under [`Frame::key`], the decimal CRC-32 of the bytes,
//! so byte-identical frames collapse into one store entry.

use crc::{CRC_32_ISO_HDLC, Crc};
use log::warn;

use crate::config::SsidFilter;
use crate::scan::{BeaconAccumulator, SensorSample, WifiNetwork};

pub const FRAME_HEADER_LEN: usize = 12;
pub const WIFI_RECORD_LEN: usize = 7;
pub const BEACON_RECORD_LEN: usize = 21;

/// Same polynomial as zlib / `binascii.crc32`.
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// An encoded, immutable frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Wrap bytes produced elsewhere (e.g. read back from the store).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Content-addressed store key.
    pub fn key(&self) -> String {
        CRC32.checksum(&self.bytes).to_string()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Assembles a [`Frame`] from one wake's observations.
pub struct FrameBuilder<'a> {
    filter: &'a SsidFilter,
}

impl<'a> FrameBuilder<'a> {
    pub fn new(filter: &'a SsidFilter) -> Self {
        Self { filter }
    }

    pub fn build(
        &self,
        timestamp: i32,
        sample: SensorSample,
        networks: &[WifiNetwork],
        beacons: &BeaconAccumulator,
    ) -> Frame {
        let kept: Vec<&WifiNetwork> = networks
            .iter()
            .filter(|n| !self.filter.is_excluded(n.ssid.as_str()))
            .collect();
        let wifi_count = capped_count("WiFi sightings", kept.len());
        let beacon_count = capped_count("beacons", beacons.len());

        let mut out = Vec::with_capacity(
            FRAME_HEADER_LEN
                + wifi_count as usize * WIFI_RECORD_LEN
                + beacon_count as usize * BEACON_RECORD_LEN,
        );
        out.extend_from_slice(&timestamp.to_be_bytes());
        out.extend_from_slice(&sample.battery.to_be_bytes());
        out.extend_from_slice(&sample.hall.to_be_bytes());
        out.extend_from_slice(&sample.temperature.to_be_bytes());
        out.push(wifi_count);
        out.push(beacon_count);

        for net in kept.iter().take(wifi_count as usize) {
            out.extend_from_slice(&net.mac);
            out.push(net.rssi as u8);
        }
        for (id, rssi) in beacons.iter().take(beacon_count as usize) {
            out.extend_from_slice(id);
            out.push(*rssi as u8);
        }

        Frame { bytes: out }
    }
}

fn capped_count(what: &str, n: usize) -> u8 {
    if n > u8::MAX as usize {
        warn!("Frame: {} {} exceed 255, truncating", n, what);
    }
    n.min(u8::MAX as usize) as u8
}
