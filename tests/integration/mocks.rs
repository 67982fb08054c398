//! Mock device and sinks for integration tests.
//!
//! `MockDevice` implements every device port the wake cycle needs. HTTP is
//! answered by a scripted handler and every request is recorded so tests can
//! assert on the full exchange.

use std::cell::Cell;
use std::time::Duration;

use cwa_sensor::app::events::AppEvent;
use cwa_sensor::app::ports::{
    EventSink, HttpPort, HttpRequest, HttpResponse, LinkPort, Method, RetentionPort,
    RetentionSlot, ScanPort, SensorPort, TimePort,
};
use cwa_sensor::config::NodeConfig;
use cwa_sensor::error::NetworkError;
use cwa_sensor::scan::{BeaconAccumulator, SensorSample, WifiNetwork};
use cwa_sensor::scheduler::VolatileRetention;
use cwa_sensor::upload::CHECKSUM_LEN;

pub type Handler = Box<dyn FnMut(&HttpRequest) -> Result<HttpResponse, NetworkError>>;

pub const AP_NAME: &str = "CWA-Uplink";

// ── MockDevice ────────────────────────────────────────────────

pub struct MockDevice {
    pub sample: SensorSample,
    pub panic_on_sample: bool,
    pub networks: Vec<WifiNetwork>,
    pub beacons: Vec<[u8; 20]>,
    pub rtc: VolatileRetention,
    pub clock: Cell<i32>,
    pub link_ok: bool,
    pub associations: usize,
    pub disconnects: usize,
    pub time_syncs: usize,
    pub requests: Vec<HttpRequest>,
    handler: Handler,
}

#[allow(dead_code)]
impl MockDevice {
    /// A device that sees no networks and has no uplink.
    pub fn new() -> Self {
        Self {
            sample: SensorSample {
                battery: 0xB000,
                hall: 3,
                temperature: 113,
            },
            panic_on_sample: false,
            networks: Vec::new(),
            beacons: Vec::new(),
            rtc: VolatileRetention::new(),
            clock: Cell::new(1_600_000_000),
            link_ok: true,
            associations: 0,
            disconnects: 0,
            time_syncs: 0,
            requests: Vec::new(),
            handler: Box::new(|_| Err(NetworkError::Transport)),
        }
    }

    /// A device next to the uplink AP whose backend is `handler`.
    pub fn online(handler: Handler) -> Self {
        let mut dev = Self::new();
        dev.networks = vec![
            WifiNetwork::new(AP_NAME, [0x02, 0, 0, 0, 0, 1], -55),
            WifiNetwork::new("Neighbour", [0x02, 0, 0, 0, 0, 2], -80),
        ];
        dev.handler = handler;
        dev
    }

    pub fn set_handler(&mut self, handler: Handler) {
        self.handler = handler;
    }

    pub fn posts_to(&self, url: &str) -> Vec<&HttpRequest> {
        self.requests
            .iter()
            .filter(|r| r.method == Method::Post && r.url == url)
            .collect()
    }
}

impl SensorPort for MockDevice {
    fn sample(&mut self) -> SensorSample {
        if self.panic_on_sample {
            panic!("sensor bus stuck");
        }
        self.sample
    }
}

impl ScanPort for MockDevice {
    fn scan_wifi(&mut self) -> Vec<WifiNetwork> {
        self.networks.clone()
    }

    fn scan_beacons(&mut self, acc: &mut BeaconAccumulator, _window: Duration) {
        for id in &self.beacons {
            acc.record(*id, -70);
        }
        acc.finish();
    }
}

impl RetentionPort for MockDevice {
    fn read_slot(&self, slot: RetentionSlot) -> Option<u8> {
        self.rtc.read_slot(slot)
    }

    fn write_slot(&mut self, slot: RetentionSlot, value: u8) {
        self.rtc.write_slot(slot, value);
    }
}

impl TimePort for MockDevice {
    /// Advances one minute per call so every wake produces a distinct frame.
    fn now_unix(&self) -> i32 {
        let t = self.clock.get();
        self.clock.set(t + 60);
        t
    }

    fn sync_time(&mut self) -> Result<(), NetworkError> {
        self.time_syncs += 1;
        Ok(())
    }
}

impl LinkPort for MockDevice {
    fn associate(
        &mut self,
        ssid: &str,
        _pass: &str,
        _timeout: Duration,
    ) -> Result<(), NetworkError> {
        self.associations += 1;
        if self.link_ok && self.networks.iter().any(|n| n.ssid.as_str() == ssid) {
            Ok(())
        } else {
            Err(NetworkError::AssociationTimeout)
        }
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }
}

impl HttpPort for MockDevice {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        self.requests.push(request.clone());
        (self.handler)(request)
    }
}

// ── Scripted HTTP ─────────────────────────────────────────────

/// Records requests and answers them with `handler`.
pub struct ScriptedHttp {
    pub requests: Vec<HttpRequest>,
    handler: Handler,
}

impl ScriptedHttp {
    pub fn new(handler: Handler) -> Self {
        Self {
            requests: Vec::new(),
            handler,
        }
    }
}

impl HttpPort for ScriptedHttp {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        self.requests.push(request.clone());
        (self.handler)(request)
    }
}

/// Backend answer to an upload: the packet's trailing checksum.
pub fn echo_checksum(req: &HttpRequest) -> HttpResponse {
    let start = req.body.len().saturating_sub(CHECKSUM_LEN);
    HttpResponse::ok(req.body[start..].to_vec())
}

/// Open internet: probe succeeds, uploads are confirmed, everything else 404s.
#[allow(dead_code)]
pub fn open_backend(cfg: &NodeConfig) -> Handler {
    let probe = cfg.portal.probe_url.clone();
    let marker = cfg.portal.success_marker.clone();
    let upload = cfg.upload_url.clone();
    Box::new(move |req| {
        if req.url == probe {
            Ok(HttpResponse::ok(marker.as_bytes()))
        } else if req.url == upload {
            Ok(echo_checksum(req))
        } else {
            Ok(HttpResponse {
                status: 404,
                ..Default::default()
            })
        }
    })
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, pred: impl Fn(&AppEvent) -> bool) -> bool {
        self.events.iter().any(pred)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
