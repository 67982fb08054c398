//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing each application event as one line
//! to the logger (UART / USB-CDC on the device).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::upload::DrainOutcome;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Woke {
                state,
                counter,
                needs_upload,
            } => {
                info!(
                    "WAKE  | {:?} | counter={} | upload={}",
                    state, counter, needs_upload
                );
            }
            AppEvent::Sampled { wifi, beacons } => {
                info!("SCAN  | wifi={} beacons={}", wifi, beacons);
            }
            AppEvent::FrameStored { key, len, stored } => {
                if *stored {
                    info!("STORE | {} ({} bytes)", key, len);
                } else {
                    warn!("STORE | {} dropped ({} bytes)", key, len);
                }
            }
            AppEvent::ApUnavailable => {
                info!("LINK  | access point not in range");
            }
            AppEvent::LinkFailed(e) => {
                warn!("LINK  | {}", e);
            }
            AppEvent::Online(online) => {
                info!("NET   | online={}", online);
            }
            AppEvent::Drained(outcome) => match outcome {
                DrainOutcome::FullySynced { batches, frames } => {
                    info!("DRAIN | synced frames={} batches={}", frames, batches);
                }
                DrainOutcome::PartialFailure {
                    batches,
                    frames,
                    cause,
                } => {
                    warn!(
                        "DRAIN | failed after frames={} batches={}: {}",
                        frames, batches, cause
                    );
                }
                DrainOutcome::NoFramesAvailable => {
                    info!("DRAIN | nothing to send");
                }
            },
            AppEvent::ConfigUpdated => {
                info!("OTA   | configuration replaced, active next wake");
            }
            AppEvent::ConfigRejected(e) => {
                warn!("OTA   | rejected: {}", e);
            }
            AppEvent::CycleAborted(reason) => {
                warn!("ABORT | {}", reason);
            }
            AppEvent::Sleeping(plan) => {
                info!(
                    "SLEEP | {}s{} | counter={}",
                    plan.duration.as_secs(),
                    if plan.extended { " (extended)" } else { "" },
                    plan.counter
                );
            }
        }
    }
}
