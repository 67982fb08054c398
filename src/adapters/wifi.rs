//! WiFi station-mode adapter.
//!
//! Provides the station scan half of [`ScanPort`] and implements
//! [`LinkPort`] for the one association per upload wake.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver via `esp_idf_svc::wifi`.
//! - **all other targets**: simulation with a fixed set of visible networks.
//!
//! ## Association
//!
//! `associate` issues a non-blocking connect and then polls the driver every
//! 10 ms until the network interface is up or the timeout elapses. There is
//! no reconnect loop: a failed association ends the upload for this wake.

use std::time::{Duration, Instant};

#[allow(unused_imports)]
use log::{error, info, warn};

use crate::app::ports::LinkPort;
use crate::error::NetworkError;
use crate::scan::WifiNetwork;

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{
    AccessPointInfo, AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi,
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Idle,
    Associating,
    Associated,
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn credentials_valid(ssid: &str, pass: &str) -> bool {
    let ssid_ok = !ssid.is_empty() && ssid.len() <= 32 && is_printable_ascii(ssid);
    let pass_ok = pass.is_empty() || (8..=64).contains(&pass.len());
    ssid_ok && pass_ok
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    #[cfg(target_os = "espidf")]
    wifi: BlockingWifi<EspWifi<'static>>,
    /// Simulation: networks every scan reports.
    #[cfg(not(target_os = "espidf"))]
    visible: Vec<WifiNetwork>,
}

impl WifiAdapter {
    /// Wrap an already-created driver and start it in station mode.
    #[cfg(target_os = "espidf")]
    pub fn new(wifi: BlockingWifi<EspWifi<'static>>) -> anyhow::Result<Self> {
        let mut adapter = Self {
            state: WifiState::Idle,
            wifi,
        };
        adapter
            .wifi
            .set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
        adapter.wifi.start()?;
        info!("WiFi(espidf): station started");
        Ok(adapter)
    }

    /// Simulated radio that sees `visible` on every scan and can associate
    /// with any of them.
    #[cfg(not(target_os = "espidf"))]
    pub fn simulated(visible: Vec<WifiNetwork>) -> Self {
        info!("WiFi(sim): {} networks in range", visible.len());
        Self {
            state: WifiState::Idle,
            visible,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    /// One blocking station scan, unfiltered. Scan failures yield an empty
    /// list, which the scheduler counts as an empty scan.
    #[cfg(target_os = "espidf")]
    pub fn scan(&mut self) -> Vec<WifiNetwork> {
        match self.wifi.scan() {
            Ok(aps) => {
                let networks: Vec<WifiNetwork> = aps.iter().map(to_network).collect();
                info!("WiFi: scan found {} networks", networks.len());
                networks
            }
            Err(e) => {
                warn!("WiFi: scan failed ({})", e);
                Vec::new()
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn scan(&mut self) -> Vec<WifiNetwork> {
        info!("WiFi(sim): scan found {} networks", self.visible.len());
        self.visible.clone()
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self, ssid: &str, pass: &str) -> Result<(), NetworkError> {
        let mut client = ClientConfiguration {
            auth_method: if pass.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };
        client
            .ssid
            .push_str(ssid)
            .map_err(|_| NetworkError::ConnectionFailed)?;
        client
            .password
            .push_str(pass)
            .map_err(|_| NetworkError::ConnectionFailed)?;

        self.wifi
            .set_configuration(&Configuration::Client(client))
            .map_err(|e| {
                error!("WiFi: set_configuration failed ({})", e);
                NetworkError::ConnectionFailed
            })?;
        self.wifi.wifi_mut().connect().map_err(|e| {
            error!("WiFi: connect failed ({})", e);
            NetworkError::ConnectionFailed
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self, ssid: &str, _pass: &str) -> Result<(), NetworkError> {
        info!("WiFi(sim): connecting to '{}'", ssid);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_up(&self, _ssid: &str) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_up(&self, ssid: &str) -> bool {
        self.visible.iter().any(|n| n.ssid.as_str() == ssid)
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi: disconnect failed ({})", e);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        info!("WiFi(sim): disconnected");
    }
}

#[cfg(target_os = "espidf")]
fn to_network(ap: &AccessPointInfo) -> WifiNetwork {
    WifiNetwork::new(ap.ssid.as_str(), ap.bssid, ap.signal_strength)
}

// ───────────────────────────────────────────────────────────────
// LinkPort
// ───────────────────────────────────────────────────────────────

impl LinkPort for WifiAdapter {
    fn associate(
        &mut self,
        ssid: &str,
        pass: &str,
        timeout: Duration,
    ) -> Result<(), NetworkError> {
        if !credentials_valid(ssid, pass) {
            error!("WiFi: invalid credentials for '{}'", ssid);
            return Err(NetworkError::ConnectionFailed);
        }

        info!("WiFi: associating with '{}' (timeout {:?})", ssid, timeout);
        self.state = WifiState::Associating;
        if let Err(e) = self.platform_connect(ssid, pass) {
            self.state = WifiState::Idle;
            return Err(e);
        }

        let deadline = Instant::now() + timeout;
        while !self.platform_is_up(ssid) {
            if Instant::now() >= deadline {
                warn!("WiFi: no association after {:?}", timeout);
                self.platform_disconnect();
                self.state = WifiState::Idle;
                return Err(NetworkError::AssociationTimeout);
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        self.state = WifiState::Associated;
        info!("WiFi: associated with '{}'", ssid);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.state == WifiState::Idle {
            return;
        }
        self.platform_disconnect();
        self.state = WifiState::Idle;
        info!("WiFi: disconnected");
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
