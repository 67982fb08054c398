//! Outbound application events.
//!
//! The [`WakeCycleService`](super::service::WakeCycleService) emits these
//! through the [`EventSink`](super::ports::EventSink) port. Adapters on the
//! other side decide what to do with them.

use crate::error::{Error, NetworkError};
use crate::scheduler::{SleepPlan, WakeState};
use crate::upload::DrainOutcome;

/// Structured events emitted by the application core, in wake-cycle order.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Retention memory has been read and the counter advanced.
    Woke {
        state: WakeState,
        counter: u8,
        needs_upload: bool,
    },

    /// Radios and sensors have been sampled.
    Sampled { wifi: usize, beacons: usize },

    /// A frame reached the store (`stored == false` when it was dropped).
    FrameStored {
        key: String,
        len: usize,
        stored: bool,
    },

    /// An upload was due but the configured AP was not in the scan.
    ApUnavailable,

    /// Association with the AP failed.
    LinkFailed(NetworkError),

    /// Result of captive-portal negotiation.
    Online(bool),

    /// Result of one drain.
    Drained(DrainOutcome),

    /// A verified configuration was persisted for the next wake.
    ConfigUpdated,

    /// An over-the-air configuration was rejected.
    ConfigRejected(Error),

    /// The wake-cycle body failed or panicked; finalization still ran.
    CycleAborted(String),

    /// The device is about to suspend.
    Sleeping(SleepPlan),
}
