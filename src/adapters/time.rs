//! ESP32 time adapter.
//!
//! Implements [`TimePort`]: wall-clock seconds for frame timestamps and a
//! one-shot SNTP synchronization once the node has egress.
//!
//! - **`target_os = "espidf"`**: `gettimeofday()` and `esp_idf_svc::sntp`.
//! - **`not(target_os = "espidf")`**: `std::time::SystemTime`; sync is a no-op.
//!
//! The RTC keeps counting through deep sleep, so a clock synchronized on one
//! upload wake still yields usable timestamps on the following wakes.

use std::time::Duration;

#[allow(unused_imports)]
use log::{info, warn};

use crate::app::ports::TimePort;
use crate::error::NetworkError;

/// How long `sync_time` waits for the first SNTP reply.
pub const SNTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Anything earlier than 2020-01-01 means the clock was never set.
pub const EPOCH_2020: i64 = 1_577_836_800;

pub struct Esp32TimeAdapter {
    sync_timeout: Duration,
    synced: bool,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            sync_timeout: SNTP_TIMEOUT,
            synced: false,
        }
    }

    /// Whether `sync_time` succeeded during this wake.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Seconds since the epoch as reported by the system clock.
    #[cfg(target_os = "espidf")]
    pub fn epoch_secs(&self) -> i64 {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return 0;
        }
        tv.tv_sec as i64
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn epoch_secs(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64)
    }

    pub fn clock_is_set(&self) -> bool {
        self.epoch_secs() >= EPOCH_2020
    }

    #[cfg(target_os = "espidf")]
    fn platform_sync(&self) -> Result<(), NetworkError> {
        use esp_idf_svc::sntp::{EspSntp, SyncStatus};

        let sntp = EspSntp::new_default().map_err(|e| {
            warn!("Time: SNTP start failed ({})", e);
            NetworkError::Transport
        })?;
        let deadline = std::time::Instant::now() + self.sync_timeout;
        while sntp.get_sync_status() != SyncStatus::Completed {
            if std::time::Instant::now() >= deadline {
                return Err(NetworkError::Timeout);
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_sync(&self) -> Result<(), NetworkError> {
        info!("Time(sim): host clock already synchronized");
        Ok(())
    }
}

impl TimePort for Esp32TimeAdapter {
    fn now_unix(&self) -> i32 {
        // Frame timestamps are i32; saturate rather than wrap after 2038.
        self.epoch_secs().clamp(0, i32::MAX as i64) as i32
    }

    fn sync_time(&mut self) -> Result<(), NetworkError> {
        info!("Time: SNTP sync (timeout {:?})", self.sync_timeout);
        self.platform_sync()?;
        self.synced = true;
        info!("Time: clock synchronized, now {}", self.epoch_secs());
        Ok(())
    }
}
