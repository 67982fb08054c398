//! Board adapter: bundles the device adapters behind the port traits.
//!
//! The wake cycle wants one `&mut` handle for everything radio- and
//! clock-related, because the WiFi driver serves both the scan and the
//! uplink. `Board` owns each adapter and forwards every port method.

use std::time::Duration;

use crate::app::ports::{
    HttpPort, HttpRequest, HttpResponse, LinkPort, RetentionPort, RetentionSlot, ScanPort,
    SensorPort, TimePort,
};
use crate::error::NetworkError;
use crate::scan::{BeaconAccumulator, SensorSample, WifiNetwork};

use super::ble::BleScanner;
use super::http::HttpClientAdapter;
use super::rtc::RtcRetention;
use super::sensors::OnboardSensors;
use super::time::Esp32TimeAdapter;
use super::wifi::WifiAdapter;

pub struct Board {
    pub sensors: OnboardSensors,
    pub ble: BleScanner,
    pub wifi: WifiAdapter,
    pub rtc: RtcRetention,
    pub time: Esp32TimeAdapter,
    pub http: HttpClientAdapter,
}

impl SensorPort for Board {
    fn sample(&mut self) -> SensorSample {
        self.sensors.sample()
    }
}

impl ScanPort for Board {
    fn scan_wifi(&mut self) -> Vec<WifiNetwork> {
        self.wifi.scan()
    }

    fn scan_beacons(&mut self, acc: &mut BeaconAccumulator, window: Duration) {
        self.ble.scan(acc, window);
        // The radio is shared; BLE must be down before WiFi scans.
        self.ble.shutdown();
    }
}

impl RetentionPort for Board {
    fn read_slot(&self, slot: RetentionSlot) -> Option<u8> {
        self.rtc.read_slot(slot)
    }

    fn write_slot(&mut self, slot: RetentionSlot, value: u8) {
        self.rtc.write_slot(slot, value);
    }
}

impl TimePort for Board {
    fn now_unix(&self) -> i32 {
        self.time.now_unix()
    }

    fn sync_time(&mut self) -> Result<(), NetworkError> {
        self.time.sync_time()
    }
}

impl LinkPort for Board {
    fn associate(
        &mut self,
        ssid: &str,
        pass: &str,
        timeout: Duration,
    ) -> Result<(), NetworkError> {
        self.wifi.associate(ssid, pass, timeout)
    }

    fn disconnect(&mut self) {
        self.wifi.disconnect();
    }
}

impl HttpPort for Board {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        self.http.execute(request)
    }
}
