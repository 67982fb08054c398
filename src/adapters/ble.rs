//! BLE exposure-notification scanner.
//!
//! Runs one passive Bluedroid GAP scan per wake and records every
//! exposure-notification advertisement into the caller's
//! [`BeaconAccumulator`].
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GAP scan via `esp_idf_svc::sys`.
//! - **all other targets**: simulation stub that completes immediately.
//!
//! ## Callback bridge
//!
//! Bluedroid callbacks are C function pointers that cannot capture Rust
//! closures. For the duration of a scan the accumulator is parked in
//! [`SCAN_SLOT`]; the GAP callback records into it and marks it complete,
//! and the poll loop in [`BleScanner::scan`] moves it back out once it has
//! observed completion.

use std::time::Duration;

#[allow(unused_imports)]
use log::{error, info, warn};

use crate::scan::{BeaconAccumulator, BeaconId};

/// Exposure-notification advertisements are exactly this long.
pub const EN_ADV_LEN: usize = 31;

/// Flags AD, 16-bit service UUID list (0xFD6F), service data header (0xFD6F).
pub const EN_ADV_PREFIX: [u8; 11] = [
    0x02, 0x01, 0x1a, 0x03, 0x03, 0x6f, 0xfd, 0x17, 0x16, 0x6f, 0xfd,
];

/// Poll interval while waiting for scan completion.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Extra time granted past the scan window before giving up on the
/// completion event.
const COMPLETION_GRACE: Duration = Duration::from_secs(2);

/// Beacon id (rolling proximity identifier + metadata) of an
/// exposure-notification advertisement, or `None` for anything else.
pub fn exposure_notification_id(adv: &[u8]) -> Option<BeaconId> {
    if adv.len() != EN_ADV_LEN || adv[..EN_ADV_PREFIX.len()] != EN_ADV_PREFIX {
        return None;
    }
    let mut id = [0u8; 20];
    id.copy_from_slice(&adv[EN_ADV_PREFIX.len()..]);
    Some(id)
}

pub fn is_exposure_notification(adv: &[u8]) -> bool {
    exposure_notification_id(adv).is_some()
}

// ── ESP-IDF callback state ─────────────────────────────────────

#[cfg(target_os = "espidf")]
static SCAN_SLOT: std::sync::Mutex<Option<BeaconAccumulator>> = std::sync::Mutex::new(None);

/// Scan window (seconds) handed from `scan` to the params-set callback.
#[cfg(target_os = "espidf")]
static SCAN_SECS: core::sync::atomic::AtomicU32 = core::sync::atomic::AtomicU32::new(1);

#[cfg(target_os = "espidf")]
fn with_slot(f: impl FnOnce(&mut BeaconAccumulator)) {
    if let Ok(mut slot) = SCAN_SLOT.lock() {
        if let Some(acc) = slot.as_mut() {
            f(acc);
        }
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use core::sync::atomic::Ordering;
    use esp_idf_svc::sys::*;

    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_PARAM_SET_COMPLETE_EVT => {
            let secs = SCAN_SECS.load(Ordering::Relaxed);
            let ret = unsafe { esp_ble_gap_start_scanning(secs) };
            if ret != ESP_OK as esp_err_t {
                log::error!("BLE: start_scanning failed ({})", ret);
                with_slot(BeaconAccumulator::finish);
            }
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_RESULT_EVT => {
            let r = unsafe { &(*param).scan_rst };
            match r.search_evt {
                esp_gap_search_evt_t_ESP_GAP_SEARCH_INQ_RES_EVT => {
                    let len = (r.adv_data_len as usize).min(r.ble_adv.len());
                    if let Some(id) = exposure_notification_id(&r.ble_adv[..len]) {
                        let rssi = r.rssi.clamp(i8::MIN as i32, i8::MAX as i32) as i8;
                        with_slot(|acc| acc.record(id, rssi));
                    }
                }
                esp_gap_search_evt_t_ESP_GAP_SEARCH_INQ_CMPL_EVT => {
                    with_slot(BeaconAccumulator::finish);
                }
                _ => {}
            }
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// Scanner
// ───────────────────────────────────────────────────────────────

pub struct BleScanner {
    ready: bool,
}

impl BleScanner {
    /// Bring up the BLE controller and Bluedroid.
    #[cfg(target_os = "espidf")]
    pub fn new() -> Self {
        use esp_idf_svc::sys::*;

        fn check(what: &str, ret: esp_err_t) -> bool {
            if ret != ESP_OK as esp_err_t {
                error!("BLE: {} failed ({})", what, ret);
            }
            ret == ESP_OK as esp_err_t
        }

        // SAFETY: single-threaded bring-up before any other BT call.
        let ready = unsafe {
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);
            let mut bt_cfg = esp_bt_controller_config_t::default();
            check("bt_controller_init", esp_bt_controller_init(&mut bt_cfg))
                && check(
                    "bt_controller_enable",
                    esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE),
                )
                && check("bluedroid_init", esp_bluedroid_init())
                && check("bluedroid_enable", esp_bluedroid_enable())
                && check(
                    "gap_register_callback",
                    esp_ble_gap_register_callback(Some(ble_gap_event_handler)),
                )
        };
        if ready {
            info!("BLE(espidf): Bluedroid ready for scanning");
        }
        Self { ready }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        info!("BLE(sim): scanner ready");
        Self { ready: true }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Scan for `window`, recording into `acc`. Blocks in a 10 ms poll loop
    /// until the stack reports completion.
    #[cfg(target_os = "espidf")]
    pub fn scan(&mut self, acc: &mut BeaconAccumulator, window: Duration) {
        use core::sync::atomic::Ordering;
        use esp_idf_svc::sys::*;

        if !self.ready {
            warn!("BLE: stack not ready, skipping scan");
            return;
        }

        let secs = window.as_secs().clamp(1, u32::MAX as u64) as u32;
        SCAN_SECS.store(secs, Ordering::Relaxed);
        match SCAN_SLOT.lock() {
            Ok(mut slot) => *slot = Some(core::mem::take(acc)),
            Err(_) => {
                error!("BLE: scan slot poisoned");
                return;
            }
        }

        // 100 % duty passive scan: interval == window.
        let mut params = esp_ble_scan_params_t {
            scan_type: esp_ble_scan_type_t_BLE_SCAN_TYPE_PASSIVE,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            scan_filter_policy: esp_ble_scan_filter_t_BLE_SCAN_FILTER_ALLOW_ALL,
            scan_interval: 0x50,
            scan_window: 0x50,
            scan_duplicate: esp_ble_scan_duplicate_t_BLE_SCAN_DUPLICATE_DISABLE,
        };
        info!("BLE: scanning for {}s", secs);
        let ret = unsafe { esp_ble_gap_set_scan_params(&mut params) };
        if ret != ESP_OK as esp_err_t {
            error!("BLE: set_scan_params failed ({})", ret);
            with_slot(BeaconAccumulator::finish);
        }

        let deadline = std::time::Instant::now() + window + COMPLETION_GRACE;
        loop {
            let done = SCAN_SLOT
                .lock()
                .map(|s| s.as_ref().is_none_or(BeaconAccumulator::is_complete))
                .unwrap_or(true);
            if done {
                break;
            }
            if std::time::Instant::now() >= deadline {
                warn!("BLE: no completion event, stopping scan");
                unsafe {
                    esp_ble_gap_stop_scanning();
                }
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        if let Ok(mut slot) = SCAN_SLOT.lock() {
            *acc = slot.take().unwrap_or_default();
        }
        info!("BLE: {} beacons", acc.len());
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn scan(&mut self, acc: &mut BeaconAccumulator, window: Duration) {
        info!("BLE(sim): scan window {:?}, no radio", window);
        acc.finish();
    }

    /// Release the controller so the modem is free for WiFi.
    #[cfg(target_os = "espidf")]
    pub fn shutdown(&mut self) {
        use esp_idf_svc::sys::*;
        if !self.ready {
            return;
        }
        unsafe {
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
        self.ready = false;
        info!("BLE(espidf): stack shut down");
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn shutdown(&mut self) {
        self.ready = false;
        info!("BLE(sim): stopped");
    }
}

impl Default for BleScanner {
    fn default() -> Self {
        Self::new()
    }
}
