//! Observation types handed to the core by the radio and sensor collaborators.
//!
//! The BLE adapter fills a [`BeaconAccumulator`] owned by the caller:
//!
//! ```text
//!  wake cycle ──&mut acc──▶ ScanPort::scan_beacons ──▶ GAP callback ──record()──▶ acc
//!       ▲                                                                         │
//!       └──────────── poll loop observes acc.is_complete() ◀──────finish()────────┘
//! ```
//!
//! The caller only reads the accumulator after the poll loop has seen the
//! completion flag, so no locking is involved on the reader side.

use log::warn;

/// Rolling proximity identifier + metadata carried by an exposure notification.
pub type BeaconId = [u8; 20];

/// Distinct beacons tracked per scan window (must be a power of two).
pub const MAX_BEACONS: usize = 128;

/// One access point seen by the station-mode scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiNetwork {
    pub ssid: heapless::String<32>,
    pub mac: [u8; 6],
    pub rssi: i8,
    pub hidden: bool,
}

impl WifiNetwork {
    /// Convenience constructor; SSIDs longer than 32 bytes are truncated.
    pub fn new(ssid: &str, mac: [u8; 6], rssi: i8) -> Self {
        let mut s = heapless::String::new();
        for ch in ssid.chars() {
            if s.push(ch).is_err() {
                break;
            }
        }
        Self {
            hidden: s.is_empty(),
            ssid: s,
            mac,
            rssi,
        }
    }
}

/// Raw readings from the on-board sensors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorSample {
    /// Battery divider ADC reading.
    pub battery: u16,
    pub hall: i16,
    /// Raw die temperature.
    pub temperature: i16,
}

/// Beacons observed during one BLE scan window, keyed by id.
///
/// Re-sightings of the same id overwrite the RSSI, so the latest
/// reading wins. Insertion order is preserved for frame encoding.
#[derive(Debug, Default)]
pub struct BeaconAccumulator {
    seen: heapless::FnvIndexMap<BeaconId, i8, MAX_BEACONS>,
    complete: bool,
    dropped: u32,
}

impl BeaconAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting. Called from the scan callback.
    pub fn record(&mut self, id: BeaconId, rssi: i8) {
        if self.seen.insert(id, rssi).is_err() {
            self.dropped = self.dropped.saturating_add(1);
        }
    }

    /// Mark the scan window closed. Called from the scan-done callback.
    pub fn finish(&mut self) {
        if self.dropped > 0 {
            warn!("BLE: accumulator full, dropped {} sightings", self.dropped);
        }
        self.complete = true;
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BeaconId, &i8)> {
        self.seen.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_rssi_wins() {
        let mut acc = BeaconAccumulator::new();
        acc.record([1; 20], -80);
        acc.record([2; 20], -70);
        acc.record([1; 20], -60);
        assert_eq!(acc.len(), 2);
        let first = acc.iter().next().unwrap();
        assert_eq!((*first.0, *first.1), ([1; 20], -60));
    }

    #[test]
    fn overflow_is_dropped_not_fatal() {
        let mut acc = BeaconAccumulator::new();
        for i in 0..(MAX_BEACONS + 5) {
            let mut id = [0u8; 20];
            id[..8].copy_from_slice(&(i as u64).to_be_bytes());
            acc.record(id, -50);
        }
        acc.finish();
        assert_eq!(acc.len(), MAX_BEACONS);
        assert!(acc.is_complete());
    }

    #[test]
    fn empty_ssid_is_hidden() {
        assert!(WifiNetwork::new("", [0; 6], -40).hidden);
        assert!(!WifiNetwork::new("Hotspot", [0; 6], -40).hidden);
    }

    #[test]
    fn long_ssid_is_truncated() {
        let n = WifiNetwork::new(&"x".repeat(40), [0; 6], -40);
        assert_eq!(n.ssid.len(), 32);
    }
}
