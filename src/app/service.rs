//! Application service: the hexagonal core.
//!
//! [`WakeCycleService`] runs one wake of the node. All I/O flows through
//! port traits injected at call sites, making the whole cycle testable with
//! mock adapters.
//!
//! ```text
//!  SensorPort ─┐                                   ┌──▶ EventSink
//!    ScanPort ─┤  ┌──────────────────────────────┐ │
//! RetentionPort├─▶│       WakeCycleService        │─┤
//!    TimePort ─┘  │ Scheduler · Store · Portal ·  │ └──▶ RetentionPort (finalize)
//!    LinkPort ─┐  │ Upload · OTA                  │
//!    HttpPort ─┴─▶└──────────────────────────────┘◀── ConfigPort + StoragePort
//! ```
//!
//! The cycle body returns `anyhow::Result` and runs under `catch_unwind`;
//! whatever happens inside, [`WakeCycleService::run`] still persists the
//! counter and returns a sleep plan.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use anyhow::Context;
use log::{error, info, warn};

use crate::config::{NodeConfig, SsidFilter};
use crate::error::{ConfigError, Error};
use crate::frame::FrameBuilder;
use crate::ota::OtaConfigUpdater;
use crate::portal::CaptivePortalAuthenticator;
use crate::scan::BeaconAccumulator;
use crate::scheduler::{SleepPlan, WakeCycleScheduler};
use crate::store::FrameStore;
use crate::upload::UploadPipeline;

use super::events::AppEvent;
use super::ports::{
    ConfigPort, EventSink, HttpPort, LinkPort, RetentionPort, ScanPort, SensorPort, StoragePort,
    TimePort,
};

// ───────────────────────────────────────────────────────────────
// WakeCycleService
// ───────────────────────────────────────────────────────────────

pub struct WakeCycleService {
    config: NodeConfig,
    filter: SsidFilter,
    store: FrameStore,
    portal: CaptivePortalAuthenticator,
    pipeline: UploadPipeline,
    ota: OtaConfigUpdater,
}

impl WakeCycleService {
    /// Build the service for one wake. `config` must already be validated.
    pub fn new(config: NodeConfig, store: FrameStore) -> Result<Self, ConfigError> {
        let filter = SsidFilter::compile(&config)?;
        Ok(Self {
            filter,
            store,
            portal: CaptivePortalAuthenticator::from_config(&config.portal),
            pipeline: UploadPipeline::new(&config),
            ota: OtaConfigUpdater::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    // ── Wake cycle ────────────────────────────────────────────

    /// Run one wake and return the sleep the caller must enter.
    ///
    /// Never fails: errors and panics inside the cycle are logged, reported
    /// as [`AppEvent::CycleAborted`], and finalization runs regardless.
    pub fn run(
        &self,
        dev: &mut (impl SensorPort + ScanPort + RetentionPort + TimePort + LinkPort + HttpPort),
        nvs: &mut (impl ConfigPort + StoragePort),
        sink: &mut impl EventSink,
    ) -> SleepPlan {
        let mut sched = WakeCycleScheduler::on_wake(&self.config, &*dev);
        sink.emit(&AppEvent::Woke {
            state: sched.state(),
            counter: sched.counter(),
            needs_upload: sched.needs_upload(),
        });

        let body = catch_unwind(AssertUnwindSafe(|| {
            self.cycle(&mut sched, dev, nvs, sink)
        }));
        let failure = match body {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(panic) => Some(panic_message(panic.as_ref())),
        };
        if let Some(reason) = failure {
            error!("Wake: cycle aborted: {}", reason);
            sink.emit(&AppEvent::CycleAborted(reason));
        }

        let plan = sched.finalize(dev);
        sink.emit(&AppEvent::Sleeping(plan));
        plan
    }

    fn cycle(
        &self,
        sched: &mut WakeCycleScheduler,
        dev: &mut (impl SensorPort + ScanPort + RetentionPort + TimePort + LinkPort + HttpPort),
        nvs: &mut (impl ConfigPort + StoragePort),
        sink: &mut impl EventSink,
    ) -> anyhow::Result<()> {
        // 1. Observe
        let sample = dev.sample();
        let mut beacons = BeaconAccumulator::new();
        dev.scan_beacons(
            &mut beacons,
            Duration::from_secs(self.config.scan_time_secs.into()),
        );
        if !beacons.is_complete() {
            warn!("Wake: beacon scan did not complete, using partial results");
        }
        let networks = dev.scan_wifi();
        sched.observe_scan(&networks, &self.config.ap_name);
        sink.emit(&AppEvent::Sampled {
            wifi: networks.len(),
            beacons: beacons.len(),
        });

        // 2. Persist
        let frame =
            FrameBuilder::new(&self.filter).build(dev.now_unix(), sample, &networks, &beacons);
        let key = frame.key();
        let stored = self.store.put_frame(&frame).is_some();
        sink.emit(&AppEvent::FrameStored {
            key,
            len: frame.len(),
            stored,
        });

        // 3. Decide
        if !sched.needs_upload() {
            return Ok(());
        }
        if !sched.ap_available() {
            info!("Wake: '{}' not in range, skipping upload", self.config.ap_name);
            sink.emit(&AppEvent::ApUnavailable);
            return Ok(());
        }

        // 4. Connect
        if let Err(e) = dev.associate(
            &self.config.ap_name,
            &self.config.ap_pass,
            Duration::from_secs(self.config.wifi_connect_timeout_secs.into()),
        ) {
            sink.emit(&AppEvent::LinkFailed(e));
            return Err(Error::from(e))
                .with_context(|| format!("associating with '{}'", self.config.ap_name));
        }

        let result = self.upload(sched, dev, nvs, sink);
        dev.disconnect();
        result
    }

    fn upload(
        &self,
        sched: &mut WakeCycleScheduler,
        dev: &mut (impl TimePort + HttpPort),
        nvs: &mut (impl ConfigPort + StoragePort),
        sink: &mut impl EventSink,
    ) -> anyhow::Result<()> {
        let online = self.portal.ensure_online(dev);
        sink.emit(&AppEvent::Online(online));
        if !online {
            return Ok(());
        }

        if let Err(e) = dev.sync_time() {
            warn!("Wake: time sync failed ({}), keeping local clock", e);
        }

        let outcome = self.pipeline.drain(&self.store, dev);
        sched.record_drain(&outcome);
        let synced = outcome.is_fully_synced();
        sink.emit(&AppEvent::Drained(outcome));

        if synced && self.ota.record_sync(nvs) {
            match self.ota.update(dev, &*nvs) {
                Ok(_) => sink.emit(&AppEvent::ConfigUpdated),
                Err(e) => {
                    warn!("OTA: update rejected ({})", e);
                    sink.emit(&AppEvent::ConfigRejected(e));
                }
            }
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_owned()
    }
}
