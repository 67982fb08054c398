//! System configuration parameters
//!
//! All tunable parameters for the sensor node. Defaults describe the
//! reference deployment; values can be replaced over the air (see
//! [`crate::ota`]) and are persisted in NVS.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Captive-portal provider fitted to this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortalProvider {
    /// Open network, no portal adapter. Detection still runs.
    None,
    /// Hidden-form resubmission portal (hotsplots style).
    FormResubmission,
    /// Anonymous subscribe-then-authenticate portal (access.network style).
    SubscriptionFlow,
}

/// Captive-portal detection and provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    pub provider: PortalProvider,
    /// Probe fetched to decide whether egress is already open.
    pub probe_url: String,
    /// Body the probe returns when nothing intercepts the request.
    pub success_marker: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            provider: PortalProvider::FormResubmission,
            probe_url: "http://captive.apple.com".into(),
            success_marker: "<HTML><HEAD><TITLE>Success</TITLE></HEAD><BODY>Success</BODY></HTML>"
                .into(),
        }
    }
}

/// Core node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    // --- Identity ---
    /// Client id stamped into every upload packet header
    pub client_id: u16,

    // --- Duty cycle ---
    /// Wakes to accumulate before an upload is attempted
    pub wakeup_threshold: u8,
    /// Base deep-sleep duration (seconds)
    pub sleep_time_secs: u32,
    /// Deep-sleep duration once the node looks out of coverage (seconds)
    pub extended_sleep_time_secs: u32,
    /// Consecutive empty WiFi scans before switching to the extended sleep
    pub empty_wifi_threshold: u8,

    // --- Radio ---
    /// BLE scan window (seconds)
    pub scan_time_secs: u32,
    /// Station association timeout (seconds)
    pub wifi_connect_timeout_secs: u32,
    /// SSID of the access point used for uploads
    pub ap_name: String,
    /// Passphrase of the upload access point (empty for open networks)
    pub ap_pass: String,

    // --- Upload ---
    pub upload_url: String,
    /// Upper bound on concatenated frame bytes per packet
    pub max_packet_size: u32,
    /// Upper bound on frames per packet
    pub max_frames_per_packet: u8,

    // --- Config over the air ---
    pub ota_url: String,
    /// Fetch configuration after this many fully-synced uploads
    pub ota_interval: u8,

    // --- Privacy filter ---
    pub ssid_exclude_prefix: Vec<String>,
    pub ssid_exclude_suffix: Vec<String>,
    pub ssid_exclude_regex: Vec<String>,

    pub portal: PortalConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            client_id: 1337,

            wakeup_threshold: 10,
            sleep_time_secs: 60,
            extended_sleep_time_secs: 300,
            empty_wifi_threshold: 10,

            scan_time_secs: 1,
            wifi_connect_timeout_secs: 10,
            ap_name: "Hotspot".into(),
            ap_pass: String::new(),

            upload_url: "http://backend:1919/submit".into(),
            max_packet_size: 10_000,
            max_frames_per_packet: 30,

            ota_url: "http://backend:1919/ota".into(),
            ota_interval: 10,

            ssid_exclude_prefix: vec!["AndroidAP".into()],
            ssid_exclude_suffix: vec!["_nomap".into()],
            ssid_exclude_regex: vec![
                r".*[M|m]obile[ |\-|_]?[H|h]otspot.*".into(),
                r".*[M|m]obile[ |\-|_]?[W|w][I|i][ |\-]?[F|f][I|i].*".into(),
                r".*[M|m][I|i][\-]?[F|f][I|i].*".into(),
                r".*Samsung.*".into(),
                r".*BlackBerry.*".into(),
                r".*iPhone.*".into(),
                r".*iPad.*".into(),
            ],

            portal: PortalConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Range-check every field. Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wakeup_threshold == 0 {
            return Err(ConfigError::ValidationFailed(
                "wakeup_threshold must be at least 1",
            ));
        }
        if !(1..=86_400).contains(&self.sleep_time_secs) {
            return Err(ConfigError::ValidationFailed(
                "sleep_time_secs must be 1–86400",
            ));
        }
        if self.extended_sleep_time_secs < self.sleep_time_secs
            || self.extended_sleep_time_secs > 86_400
        {
            return Err(ConfigError::ValidationFailed(
                "extended_sleep_time_secs must be sleep_time_secs–86400",
            ));
        }
        if self.empty_wifi_threshold == 0 {
            return Err(ConfigError::ValidationFailed(
                "empty_wifi_threshold must be at least 1",
            ));
        }
        if !(1..=30).contains(&self.scan_time_secs) {
            return Err(ConfigError::ValidationFailed("scan_time_secs must be 1–30"));
        }
        if !(1..=120).contains(&self.wifi_connect_timeout_secs) {
            return Err(ConfigError::ValidationFailed(
                "wifi_connect_timeout_secs must be 1–120",
            ));
        }
        if self.ap_name.is_empty() || self.ap_name.len() > 32 {
            return Err(ConfigError::ValidationFailed("ap_name must be 1–32 bytes"));
        }
        if self.ap_pass.len() > 64 {
            return Err(ConfigError::ValidationFailed("ap_pass must be 0–64 bytes"));
        }
        if !is_http_url(&self.upload_url) {
            return Err(ConfigError::ValidationFailed(
                "upload_url must start with http:// or https://",
            ));
        }
        if !is_http_url(&self.ota_url) {
            return Err(ConfigError::ValidationFailed(
                "ota_url must start with http:// or https://",
            ));
        }
        if !is_http_url(&self.portal.probe_url) {
            return Err(ConfigError::ValidationFailed(
                "portal.probe_url must start with http:// or https://",
            ));
        }
        if self.portal.success_marker.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "portal.success_marker must not be empty",
            ));
        }
        if self.max_packet_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_packet_size must be positive",
            ));
        }
        if self.max_frames_per_packet == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_frames_per_packet must be 1–255",
            ));
        }
        if self.ota_interval == 0 {
            return Err(ConfigError::ValidationFailed("ota_interval must be 1–255"));
        }
        SsidFilter::compile(self)?;
        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

// ───────────────────────────────────────────────────────────────
// SSID exclusion
// ───────────────────────────────────────────────────────────────

/// Compiled form of the `ssid_exclude_*` lists.
///
/// Regexes match from the start of the SSID (the stored patterns lead
/// with `.*` where they mean "anywhere").
#[derive(Debug, Clone)]
pub struct SsidFilter {
    prefixes: Vec<String>,
    suffixes: Vec<String>,
    patterns: Vec<Regex>,
}

impl SsidFilter {
    pub fn compile(config: &NodeConfig) -> Result<Self, ConfigError> {
        let patterns = config
            .ssid_exclude_regex
            .iter()
            .map(|p| Regex::new(&format!("^(?:{p})")))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ConfigError::ValidationFailed("ssid_exclude_regex does not compile"))?;

        Ok(Self {
            prefixes: config.ssid_exclude_prefix.clone(),
            suffixes: config.ssid_exclude_suffix.clone(),
            patterns,
        })
    }

    /// Filter that excludes nothing.
    pub fn allow_all() -> Self {
        Self {
            prefixes: Vec::new(),
            suffixes: Vec::new(),
            patterns: Vec::new(),
        }
    }

    pub fn is_excluded(&self, ssid: &str) -> bool {
        self.prefixes.iter().any(|p| ssid.starts_with(p.as_str()))
            || self.suffixes.iter().any(|s| ssid.ends_with(s.as_str()))
            || self.patterns.iter().any(|re| re.is_match(ssid))
    }
}
