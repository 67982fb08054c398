//! Deep-sleep entry.
//!
//! The wake cycle ends here: arm the RTC timer for the planned duration and
//! power down. Only RTC memory survives; the next wake starts at `main`.

use std::time::Duration;

use log::info;

use crate::scheduler::SleepPlan;

/// Arm the timer wakeup source and enter deep sleep. Never returns on the
/// device.
#[cfg(target_os = "espidf")]
pub fn deep_sleep(plan: &SleepPlan) -> ! {
    use esp_idf_svc::sys::{esp_deep_sleep_start, esp_sleep_enable_timer_wakeup};

    info!(
        "Power: deep sleep for {}s (counter {})",
        plan.duration.as_secs(),
        plan.counter
    );
    unsafe {
        esp_sleep_enable_timer_wakeup(sleep_micros(plan.duration));
        esp_deep_sleep_start();
    }
}

/// Off-target: log and block for the planned duration, so a host run of the
/// binary behaves like a slow duty cycle.
#[cfg(not(target_os = "espidf"))]
pub fn deep_sleep(plan: &SleepPlan) {
    info!("Power(sim): sleeping {:?}", plan.duration);
    std::thread::sleep(plan.duration);
}

/// Timer wakeup argument, microseconds.
pub fn sleep_micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
