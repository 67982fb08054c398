//! Wake-cycle scheduler.
//!
//! Decides, once per wake, whether an upload is attempted and how long the
//! node sleeps afterwards. Its state lives in RTC retention memory, which
//! survives deep sleep but comes back empty after a cold boot or brownout.
//!
//! ```text
//!              empty RTC
//!  ┌──────────┐ memory   ┌──────────────┐ counter > threshold ┌──────────────────┐
//!  │ ColdBoot │─────────▶│ Accumulating │────────────────────▶│ ThresholdReached │
//!  └──────────┘          └──────────────┘                     └──────────────────┘
//!                               ▲      store drained empty             │
//!                               └──────────────────────────────────────┘
//! ```
//!
//! A cold boot always requests an upload. A drain that leaves the store
//! empty (`FullySynced`, or `NoFramesAvailable` when there was nothing to
//! send) resets the counter. A failed drain leaves it where it is, so the
//! next wake simply tries again.

use std::time::Duration;

use log::info;

use crate::app::ports::{RetentionPort, RetentionSlot};
use crate::config::NodeConfig;
use crate::scan::WifiNetwork;
use crate::upload::DrainOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeState {
    ColdBoot,
    Accumulating,
    ThresholdReached,
}

/// Sleep chosen at finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPlan {
    pub duration: Duration,
    /// `true` when the node looks out of coverage.
    pub extended: bool,
    /// Counter value persisted for the next wake.
    pub counter: u8,
}

pub struct WakeCycleScheduler {
    state: WakeState,
    counter: u8,
    needs_upload: bool,
    threshold: u8,
    ap_available: bool,
    empty_streak: u8,
    empty_wifi_threshold: u8,
    sleep: Duration,
    extended_sleep: Duration,
}

impl WakeCycleScheduler {
    /// Read retention memory and advance the counter for this wake.
    pub fn on_wake(cfg: &NodeConfig, rtc: &impl RetentionPort) -> Self {
        let (state, counter, needs_upload) = match rtc.read_slot(RetentionSlot::WakeCounter) {
            None => {
                info!("Wake: retention memory empty, cold boot");
                (WakeState::ColdBoot, 1, true)
            }
            Some(prev) => {
                let counter = prev.saturating_add(1);
                if counter > cfg.wakeup_threshold {
                    (WakeState::ThresholdReached, counter, true)
                } else {
                    (WakeState::Accumulating, counter, false)
                }
            }
        };

        Self {
            state,
            counter,
            needs_upload,
            threshold: cfg.wakeup_threshold,
            ap_available: false,
            empty_streak: rtc.read_slot(RetentionSlot::EmptyScanStreak).unwrap_or(0),
            empty_wifi_threshold: cfg.empty_wifi_threshold,
            sleep: Duration::from_secs(cfg.sleep_time_secs.into()),
            extended_sleep: Duration::from_secs(cfg.extended_sleep_time_secs.into()),
        }
    }

    pub fn state(&self) -> WakeState {
        self.state
    }

    pub fn counter(&self) -> u8 {
        self.counter
    }

    pub fn needs_upload(&self) -> bool {
        self.needs_upload
    }

    pub fn ap_available(&self) -> bool {
        self.ap_available
    }

    /// Feed this wake's unfiltered WiFi scan. Updates AP availability and
    /// the empty-scan streak.
    pub fn observe_scan(&mut self, networks: &[WifiNetwork], ap_name: &str) {
        self.ap_available = networks.iter().any(|n| n.ssid.as_str() == ap_name);
        self.empty_streak = if networks.is_empty() {
            self.empty_streak.saturating_add(1)
        } else {
            0
        };
    }

    /// Upload is attempted only when requested and the AP is in range.
    pub fn should_connect(&self) -> bool {
        self.needs_upload && self.ap_available
    }

    /// Reset the counter once the store holds nothing more to send.
    pub fn record_drain(&mut self, outcome: &DrainOutcome) {
        if outcome.store_is_clear() {
            self.counter = 0;
            self.needs_upload = false;
            self.state = WakeState::Accumulating;
        }
    }

    /// Persist the counter and streak, then pick the next sleep duration.
    pub fn finalize(self, rtc: &mut impl RetentionPort) -> SleepPlan {
        rtc.write_slot(RetentionSlot::WakeCounter, self.counter);
        rtc.write_slot(RetentionSlot::EmptyScanStreak, self.empty_streak);

        if self.counter <= self.threshold {
            info!(
                "Wake: {} wakes until next upload attempt",
                u16::from(self.threshold) - u16::from(self.counter) + 1
            );
        } else {
            info!(
                "Wake: upload pending for {} wakes, retrying next time",
                self.counter - self.threshold
            );
        }

        let extended = self.empty_streak >= self.empty_wifi_threshold;
        SleepPlan {
            duration: if extended {
                self.extended_sleep
            } else {
                self.sleep
            },
            extended,
            counter: self.counter,
        }
    }
}

/// Plain in-memory retention, used off-target and in tests.
#[derive(Debug, Default, Clone)]
pub struct VolatileRetention {
    counter: Option<u8>,
    streak: Option<u8>,
}

impl VolatileRetention {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a cold boot / brownout.
    pub fn wipe(&mut self) {
        *self = Self::default();
    }
}

impl RetentionPort for VolatileRetention {
    fn read_slot(&self, slot: RetentionSlot) -> Option<u8> {
        match slot {
            RetentionSlot::WakeCounter => self.counter,
            RetentionSlot::EmptyScanStreak => self.streak,
        }
    }

    fn write_slot(&mut self, slot: RetentionSlot, value: u8) {
        match slot {
            RetentionSlot::WakeCounter => self.counter = Some(value),
            RetentionSlot::EmptyScanStreak => self.streak = Some(value),
        }
    }
}
