//! End-to-end wake cycles through `WakeCycleService::run` against the
//! mock device, the simulated NVS backend and a temp-dir frame store.

use std::time::Duration;

use cwa_sensor::adapters::ble::BleScanner;
use cwa_sensor::adapters::board::Board;
use cwa_sensor::adapters::http::HttpClientAdapter;
use cwa_sensor::adapters::nvs::NvsAdapter;
use cwa_sensor::adapters::rtc::RtcRetention;
use cwa_sensor::adapters::sensors::OnboardSensors;
use cwa_sensor::adapters::time::Esp32TimeAdapter;
use cwa_sensor::adapters::wifi::WifiAdapter;
use cwa_sensor::app::events::AppEvent;
use cwa_sensor::app::ports::{ConfigPort, HttpResponse, RetentionPort, RetentionSlot};
use cwa_sensor::app::service::WakeCycleService;
use cwa_sensor::config::NodeConfig;
use cwa_sensor::error::{ConfigError, Error, NetworkError};
use cwa_sensor::scheduler::WakeState;
use cwa_sensor::store::FrameStore;
use cwa_sensor::upload::DrainOutcome;
use tempfile::TempDir;

use super::mocks::{AP_NAME, MockDevice, RecordingSink, open_backend};

fn config(threshold: u8) -> NodeConfig {
    NodeConfig {
        wakeup_threshold: threshold,
        ap_name: AP_NAME.into(),
        ..Default::default()
    }
}

fn service(cfg: &NodeConfig) -> (WakeCycleService, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let svc = WakeCycleService::new(cfg.clone(), FrameStore::new(dir.path().join("v1.db"))).unwrap();
    (svc, dir)
}

fn woke(sink: &RecordingSink) -> (WakeState, u8, bool) {
    sink.events
        .iter()
        .find_map(|e| match e {
            AppEvent::Woke {
                state,
                counter,
                needs_upload,
            } => Some((*state, *counter, *needs_upload)),
            _ => None,
        })
        .unwrap()
}

// ── Counter and threshold ─────────────────────────────────────

#[test]
fn counter_accumulates_without_access_point() {
    let cfg = config(3);
    let (svc, _dir) = service(&cfg);
    let mut dev = MockDevice::new();
    let mut nvs = NvsAdapter::new().unwrap();

    let expected = [
        (WakeState::ColdBoot, 1, true),
        (WakeState::Accumulating, 2, false),
        (WakeState::Accumulating, 3, false),
        (WakeState::ThresholdReached, 4, true),
    ];
    for (i, want) in expected.into_iter().enumerate() {
        let mut sink = RecordingSink::new();
        let plan = svc.run(&mut dev, &mut nvs, &mut sink);
        assert_eq!(woke(&sink), want, "wake {}", i + 1);
        assert_eq!(plan.counter, want.1);
        assert_eq!(
            sink.contains(|e| *e == AppEvent::ApUnavailable),
            want.2,
            "wake {}",
            i + 1
        );
    }

    assert_eq!(svc.store().count(), Some(4));
    assert_eq!(dev.associations, 0);
    assert!(dev.requests.is_empty());
}

#[test]
fn full_sync_resets_counter_and_empties_store() {
    let cfg = config(1);
    let (svc, _dir) = service(&cfg);
    let mut dev = MockDevice::online(open_backend(&cfg));
    let mut nvs = NvsAdapter::new().unwrap();
    let mut sink = RecordingSink::new();

    let plan = svc.run(&mut dev, &mut nvs, &mut sink);

    assert_eq!(plan.counter, 0);
    assert_eq!(dev.rtc.read_slot(RetentionSlot::WakeCounter), Some(0));
    assert!(sink.contains(|e| *e == AppEvent::Online(true)));
    assert!(sink.contains(|e| *e
        == AppEvent::Drained(DrainOutcome::FullySynced {
            batches: 1,
            frames: 1
        })));
    assert_eq!(svc.store().count(), Some(0));
    assert_eq!(dev.time_syncs, 1);
    assert_eq!(dev.disconnects, 1);
    assert_eq!(dev.posts_to(&cfg.upload_url).len(), 1);

    // Next wake only accumulates.
    let mut sink = RecordingSink::new();
    let plan = svc.run(&mut dev, &mut nvs, &mut sink);
    assert_eq!(woke(&sink), (WakeState::Accumulating, 1, false));
    assert_eq!(plan.counter, 1);
    assert_eq!(svc.store().count(), Some(1));
}

#[test]
fn failed_upload_keeps_counter() {
    let cfg = config(1);
    let (svc, _dir) = service(&cfg);
    let probe = cfg.portal.probe_url.clone();
    let marker = cfg.portal.success_marker.clone();
    let mut dev = MockDevice::online(Box::new(move |req| {
        if req.url == probe {
            Ok(HttpResponse::ok(marker.as_bytes()))
        } else {
            Err(NetworkError::Timeout)
        }
    }));
    let mut nvs = NvsAdapter::new().unwrap();
    let mut sink = RecordingSink::new();

    let plan = svc.run(&mut dev, &mut nvs, &mut sink);

    assert_eq!(plan.counter, 1);
    assert!(sink.contains(|e| matches!(
        e,
        AppEvent::Drained(DrainOutcome::PartialFailure {
            batches: 0,
            frames: 0,
            cause: Error::Network(NetworkError::Timeout),
        })
    )));
    assert_eq!(svc.store().count(), Some(1));
}

// ── Failure paths still finalize ──────────────────────────────

#[test]
fn panicking_sensor_still_persists_counter() {
    let cfg = config(3);
    let (svc, _dir) = service(&cfg);
    let mut dev = MockDevice::new();
    dev.panic_on_sample = true;
    let mut nvs = NvsAdapter::new().unwrap();
    let mut sink = RecordingSink::new();

    let plan = svc.run(&mut dev, &mut nvs, &mut sink);

    assert_eq!(plan.counter, 1);
    assert_eq!(plan.duration, Duration::from_secs(60));
    assert_eq!(dev.rtc.read_slot(RetentionSlot::WakeCounter), Some(1));
    assert!(sink.contains(
        |e| matches!(e, AppEvent::CycleAborted(msg) if msg.contains("sensor bus stuck"))
    ));
    assert_eq!(sink.events.last(), Some(&AppEvent::Sleeping(plan)));
}

#[test]
fn association_failure_aborts_cycle() {
    let cfg = config(1);
    let (svc, _dir) = service(&cfg);
    let mut dev = MockDevice::online(open_backend(&cfg));
    dev.link_ok = false;
    let mut nvs = NvsAdapter::new().unwrap();
    let mut sink = RecordingSink::new();

    let plan = svc.run(&mut dev, &mut nvs, &mut sink);

    assert_eq!(plan.counter, 1);
    assert!(sink.contains(
        |e| *e == AppEvent::LinkFailed(NetworkError::AssociationTimeout)
    ));
    assert!(sink.contains(
        |e| matches!(e, AppEvent::CycleAborted(msg) if msg.contains(AP_NAME))
    ));
    assert!(dev.requests.is_empty());
    assert_eq!(svc.store().count(), Some(1));
}

#[test]
fn empty_scans_select_extended_sleep() {
    let cfg = NodeConfig {
        empty_wifi_threshold: 2,
        ..config(10)
    };
    let (svc, _dir) = service(&cfg);
    let mut dev = MockDevice::new();
    let mut nvs = NvsAdapter::new().unwrap();

    let first = svc.run(&mut dev, &mut nvs, &mut RecordingSink::new());
    assert!(!first.extended);
    assert_eq!(first.duration, Duration::from_secs(60));

    let second = svc.run(&mut dev, &mut nvs, &mut RecordingSink::new());
    assert!(second.extended);
    assert_eq!(second.duration, Duration::from_secs(300));
}

// ── Over-the-air configuration ────────────────────────────────

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn ota_device(cfg: &NodeConfig, artifact: Vec<u8>, digest: String) -> MockDevice {
    let artifact_url = format!("{}/config.json", cfg.ota_url);
    let digest_url = format!("{}/config.json.sha256", cfg.ota_url);
    let mut backend = open_backend(cfg);
    MockDevice::online(Box::new(move |req| {
        if req.url == artifact_url {
            Ok(HttpResponse::ok(artifact.clone()))
        } else if req.url == digest_url {
            Ok(HttpResponse::ok(format!("{}  config.json\n", digest)))
        } else {
            backend(req)
        }
    }))
}

#[test]
fn ota_digest_mismatch_keeps_running_config() {
    let cfg = NodeConfig {
        ota_interval: 1,
        ..config(1)
    };
    let (svc, _dir) = service(&cfg);
    let update = NodeConfig {
        client_id: 4242,
        ..Default::default()
    };
    let artifact = serde_json::to_vec(&update).unwrap();
    let wrong = hex(&hmac_sha256::Hash::hash(b"something else"));
    let mut dev = ota_device(&cfg, artifact, wrong);
    let mut nvs = NvsAdapter::new().unwrap();
    let mut sink = RecordingSink::new();

    svc.run(&mut dev, &mut nvs, &mut sink);

    assert!(sink.contains(
        |e| *e == AppEvent::ConfigRejected(Error::Config(ConfigError::DigestMismatch))
    ));
    assert_eq!(nvs.load().unwrap().client_id, 1337);
}

#[test]
fn ota_verified_config_is_persisted() {
    let cfg = NodeConfig {
        ota_interval: 1,
        ..config(1)
    };
    let (svc, _dir) = service(&cfg);
    let update = NodeConfig {
        client_id: 4242,
        ..Default::default()
    };
    let artifact = serde_json::to_vec(&update).unwrap();
    let digest = hex(&hmac_sha256::Hash::hash(&artifact));
    let mut dev = ota_device(&cfg, artifact, digest.to_uppercase());
    let mut nvs = NvsAdapter::new().unwrap();
    let mut sink = RecordingSink::new();

    svc.run(&mut dev, &mut nvs, &mut sink);

    assert!(sink.contains(|e| *e == AppEvent::ConfigUpdated));
    assert_eq!(nvs.load().unwrap().client_id, 4242);
}

// ── Simulated board ───────────────────────────────────────────

#[test]
fn simulated_board_completes_a_wake() {
    let cfg = config(3);
    let (svc, _dir) = service(&cfg);
    let mut board = Board {
        sensors: OnboardSensors::new(),
        ble: BleScanner::new(),
        wifi: WifiAdapter::simulated(Vec::new()),
        rtc: RtcRetention::new(),
        time: Esp32TimeAdapter::new(),
        http: HttpClientAdapter::new(),
    };
    let mut nvs = NvsAdapter::new().unwrap();
    let mut sink = RecordingSink::new();

    let plan = svc.run(&mut board, &mut nvs, &mut sink);

    assert_eq!(plan.counter, 1);
    assert!(sink.contains(|e| *e == AppEvent::ApUnavailable));
    assert_eq!(board.rtc.read_slot(RetentionSlot::WakeCounter), Some(1));
    assert_eq!(svc.store().count(), Some(1));
}
