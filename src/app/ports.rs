//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ WakeCycleService (domain)
//! ```
//!
//! Driven adapters (radios, sensors, RTC memory, HTTP, NVS, event sinks)
//! implement these traits. The [`WakeCycleService`](super::service::WakeCycleService)
//! consumes them via generics, so the domain core never touches hardware
//! directly.
//!
//! ## Durability tiers
//!
//! - **StoragePort / ConfigPort**: NVS, survives cold boot and brownout.
//! - **RetentionPort**: RTC memory, survives deep sleep only.
//! - Everything else lives in ordinary RAM and is gone on suspend.

use std::borrow::Cow;
use std::time::Duration;

use crate::config::NodeConfig;
use crate::error::{ConfigError, NetworkError, StorageError};
use crate::scan::{BeaconAccumulator, SensorSample, WifiNetwork};

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

pub trait SensorPort {
    /// Read battery, hall and die temperature once.
    fn sample(&mut self) -> SensorSample;
}

// ───────────────────────────────────────────────────────────────
// Scan port (driven adapter: radios → domain)
// ───────────────────────────────────────────────────────────────

/// Radio observations for one wake.
pub trait ScanPort {
    /// Station-mode WiFi scan. Returns every visible network, unfiltered.
    fn scan_wifi(&mut self) -> Vec<WifiNetwork>;

    /// Run a BLE scan for `window`, recording exposure-notification beacons
    /// into `acc`. Returns once the scan has completed (or failed to start);
    /// implementations must call [`BeaconAccumulator::finish`] on success.
    fn scan_beacons(&mut self, acc: &mut BeaconAccumulator, window: Duration);
}

// ───────────────────────────────────────────────────────────────
// Retention port (driven adapter: domain ↔ RTC memory)
// ───────────────────────────────────────────────────────────────

/// Named one-byte slots in deep-sleep-retained memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionSlot {
    /// Wake counter, big-endian `u8`.
    WakeCounter,
    /// Consecutive wakes whose WiFi scan came back empty.
    EmptyScanStreak,
}

/// Memory that survives deep sleep but reads back empty after a cold boot
/// or brownout reset.
pub trait RetentionPort {
    /// `None` when the slot was never written since the last cold boot.
    fn read_slot(&self, slot: RetentionSlot) -> Option<u8>;

    fn write_slot(&mut self, slot: RetentionSlot, value: u8);
}

// ───────────────────────────────────────────────────────────────
// Time port
// ───────────────────────────────────────────────────────────────

pub trait TimePort {
    /// Seconds since the Unix epoch, as the frame timestamp.
    fn now_unix(&self) -> i32;

    /// Synchronize the wall clock. Requires network egress.
    fn sync_time(&mut self) -> Result<(), NetworkError>;
}

// ───────────────────────────────────────────────────────────────
// Link port (driven adapter: domain → WiFi station)
// ───────────────────────────────────────────────────────────────

pub trait LinkPort {
    /// Associate with `ssid`, blocking for at most `timeout`.
    fn associate(&mut self, ssid: &str, pass: &str, timeout: Duration)
    -> Result<(), NetworkError>;

    fn disconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// HTTP port
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub follow_redirects: bool,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
            follow_redirects: true,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: body.into(),
            follow_redirects: true,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<'a>(mut self, headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())));
        self
    }

    pub fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Blocking HTTP client. Timeouts are enforced by the implementation.
///
/// Object-safe so portal adapters can take `&mut dyn HttpPort`.
pub trait HttpPort {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, NetworkError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port. Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists node configuration.
///
/// Implementations MUST validate before persisting and reject invalid
/// values with [`ConfigError::ValidationFailed`] rather than clamp them.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`NodeConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<NodeConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &NodeConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for small durable counters.
///
/// Write operations MUST be atomic: no partial writes on power loss.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let resp = HttpResponse {
            status: 302,
            headers: vec![("set-cookie".into(), "sid=1; Path=/".into())],
            body: Vec::new(),
        };
        assert_eq!(resp.header("Set-Cookie"), Some("sid=1; Path=/"));
        assert_eq!(resp.header("Location"), None);
    }

    #[test]
    fn request_builder_accumulates_headers() {
        let req = HttpRequest::post("http://x/", "a=1")
            .headers([("Cookie", "div=1")])
            .header("Origin", "http://x")
            .without_redirects();
        assert_eq!(req.header_value("cookie"), Some("div=1"));
        assert_eq!(req.headers.len(), 2);
        assert!(!req.follow_redirects);
        assert_eq!(req.body_text(), "a=1");
    }
}
