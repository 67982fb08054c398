//! CWA Sensor Firmware: Main Entry Point
//!
//! One process lifetime is one wake: boot, run the cycle, deep sleep.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  Board: OnboardSensors · BleScanner · WifiAdapter ·            │
//! │         RtcRetention · Esp32TimeAdapter · HttpClientAdapter    │
//! │  NvsAdapter (Config+Storage)   LogEventSink   FlashFs          │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │          WakeCycleService (pure logic)                 │    │
//! │  │  Scheduler · FrameStore · Portal · Upload · OTA        │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  power::deep_sleep(plan)                                       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::path::PathBuf;

use anyhow::Result;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::{error, info, warn};

use cwa_sensor::adapters::ble::BleScanner;
use cwa_sensor::adapters::board::Board;
use cwa_sensor::adapters::flash_fs::{FlashFs, MOUNT_POINT};
use cwa_sensor::adapters::http::HttpClientAdapter;
use cwa_sensor::adapters::log_sink::LogEventSink;
use cwa_sensor::adapters::nvs::NvsAdapter;
use cwa_sensor::adapters::power;
use cwa_sensor::adapters::rtc::RtcRetention;
use cwa_sensor::adapters::sensors::OnboardSensors;
use cwa_sensor::adapters::time::Esp32TimeAdapter;
use cwa_sensor::adapters::wifi::WifiAdapter;
use cwa_sensor::app::ports::ConfigPort;
use cwa_sensor::app::service::WakeCycleService;
use cwa_sensor::config::NodeConfig;
use cwa_sensor::scheduler::WakeCycleScheduler;
use cwa_sensor::store::{DEFAULT_STORE_FILE, FrameStore};

// ── Main ──────────────────────────────────────────────────────

fn main() {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    if let Err(e) = esp_idf_logger::init() {
        println!("Boot: logger init failed ({:?}), continuing without it", e);
    }

    info!("╔══════════════════════════════════════╗");
    info!("║  CWA sensor v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Retention and config (infallible, with fallbacks) ──
    let mut rtc = RtcRetention::new();
    let (mut nvs, config) = load_config();

    // ── 3. Wake cycle (or a bare counter tick if bring-up failed)
    let plan = match bring_up(&config) {
        Ok((service, wifi)) => {
            let mut board = Board {
                sensors: OnboardSensors::new(),
                ble: BleScanner::new(),
                wifi,
                rtc,
                time: Esp32TimeAdapter::new(),
                http: HttpClientAdapter::new(),
            };
            service.run(&mut board, &mut nvs, &mut LogEventSink::new())
        }
        Err(e) => {
            error!("Boot: bring-up failed: {:#}", e);
            WakeCycleScheduler::on_wake(&config, &rtc).finalize(&mut rtc)
        }
    };

    // ── 4. Suspend ────────────────────────────────────────────
    power::deep_sleep(&plan)
}

fn load_config() -> (NvsAdapter, NodeConfig) {
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            NvsAdapter::default()
        }
    };
    let config = match nvs.load().and_then(|cfg| cfg.validate().map(|()| cfg)) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config unusable ({}), using defaults", e);
            NodeConfig::default()
        }
    };
    (nvs, config)
}

fn bring_up(config: &NodeConfig) -> Result<(WakeCycleService, WifiAdapter)> {
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    // ── Frame store file ──────────────────────────────────────
    let store_path = match FlashFs::mount() {
        Ok(fs) => fs.store_path(),
        Err(e) => {
            warn!("Flash filesystem unavailable ({}), frames will not persist", e);
            PathBuf::from(MOUNT_POINT).join(DEFAULT_STORE_FILE)
        }
    };
    let service = match WakeCycleService::new(config.clone(), FrameStore::new(store_path.clone())) {
        Ok(s) => s,
        Err(e) => {
            warn!("Stored config unusable ({}), using defaults", e);
            WakeCycleService::new(NodeConfig::default(), FrameStore::new(store_path))?
        }
    };

    // ── WiFi driver ───────────────────────────────────────────
    let wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sysloop.clone(), None)?,
        sysloop,
    )?;
    Ok((service, WifiAdapter::new(wifi)?))
}
