//! RTC retention adapter.
//!
//! Implements [`RetentionPort`] over RTC slow memory, which stays powered
//! through deep sleep. A magic word marks the block as initialized; it is
//! cleared whenever the chip comes up from power-on or brownout, so both
//! resets read back as "never written".
//!
//! Off-target the adapter wraps [`VolatileRetention`].

#[cfg(target_os = "espidf")]
use log::info;

use crate::app::ports::{RetentionPort, RetentionSlot};
#[cfg(not(target_os = "espidf"))]
use crate::scheduler::VolatileRetention;

/// Marks the RTC block as holding values written by this firmware.
pub const RTC_MAGIC: u32 = 0xC0A5_EB1E;

#[cfg(any(target_os = "espidf", test))]
fn slot_index(slot: RetentionSlot) -> usize {
    match slot {
        RetentionSlot::WakeCounter => 0,
        RetentionSlot::EmptyScanStreak => 1,
    }
}

#[cfg(target_os = "espidf")]
mod rtc_mem {
    use core::sync::atomic::{AtomicU8, AtomicU32};

    #[unsafe(link_section = ".rtc.data")]
    pub static MAGIC: AtomicU32 = AtomicU32::new(0);

    /// Bit n set: slot n has been written since the magic was stamped.
    #[unsafe(link_section = ".rtc.data")]
    pub static PRESENT: AtomicU8 = AtomicU8::new(0);

    #[unsafe(link_section = ".rtc.data")]
    pub static SLOTS: [AtomicU8; 2] = [AtomicU8::new(0), AtomicU8::new(0)];
}

pub struct RtcRetention {
    #[cfg(not(target_os = "espidf"))]
    inner: VolatileRetention,
}

impl RtcRetention {
    /// Open the RTC block, wiping it if the last reset lost RTC power.
    #[cfg(target_os = "espidf")]
    pub fn new() -> Self {
        use core::sync::atomic::Ordering;
        use esp_idf_hal::reset::ResetReason;

        let reason = ResetReason::get();
        let stale = matches!(reason, ResetReason::PowerOn | ResetReason::Brownout);
        if stale || rtc_mem::MAGIC.load(Ordering::Relaxed) != RTC_MAGIC {
            info!("RTC: fresh retention block (reset {:?})", reason);
            rtc_mem::MAGIC.store(RTC_MAGIC, Ordering::Relaxed);
            rtc_mem::PRESENT.store(0, Ordering::Relaxed);
        }
        Self {}
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            inner: VolatileRetention::new(),
        }
    }

    /// Forget everything, as a cold boot would.
    #[cfg(target_os = "espidf")]
    pub fn wipe(&mut self) {
        rtc_mem::PRESENT.store(0, core::sync::atomic::Ordering::Relaxed);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn wipe(&mut self) {
        self.inner.wipe();
    }
}

impl Default for RtcRetention {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl RetentionPort for RtcRetention {
    fn read_slot(&self, slot: RetentionSlot) -> Option<u8> {
        use core::sync::atomic::Ordering;
        let i = slot_index(slot);
        (rtc_mem::PRESENT.load(Ordering::Relaxed) & (1 << i) != 0)
            .then(|| rtc_mem::SLOTS[i].load(Ordering::Relaxed))
    }

    fn write_slot(&mut self, slot: RetentionSlot, value: u8) {
        use core::sync::atomic::Ordering;
        let i = slot_index(slot);
        rtc_mem::SLOTS[i].store(value, Ordering::Relaxed);
        rtc_mem::PRESENT.fetch_or(1 << i, Ordering::Relaxed);
    }
}

#[cfg(not(target_os = "espidf"))]
impl RetentionPort for RtcRetention {
    fn read_slot(&self, slot: RetentionSlot) -> Option<u8> {
        self.inner.read_slot(slot)
    }

    fn write_slot(&mut self, slot: RetentionSlot, value: u8) {
        self.inner.write_slot(slot, value);
    }
}
