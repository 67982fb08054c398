//! Draining a real on-disk store through a scripted backend.

use cwa_sensor::app::ports::{HttpRequest, HttpResponse};
use cwa_sensor::config::NodeConfig;
use cwa_sensor::error::{Error, NetworkError, ProtocolError, StorageError};
use cwa_sensor::store::FrameStore;
use cwa_sensor::upload::{
    CHECKSUM_LEN, DrainOutcome, PACKET_HEADER_LEN, UploadPipeline,
};
use tempfile::TempDir;

use super::mocks::{ScriptedHttp, echo_checksum};

const URL: &str = "http://backend.test/submit";

fn config(max_frames: u8) -> NodeConfig {
    NodeConfig {
        upload_url: URL.into(),
        max_frames_per_packet: max_frames,
        ..Default::default()
    }
}

/// Store holding `n` frames of 40 bytes each, keyed `k00`, `k01`, ...
fn seeded(n: usize) -> (FrameStore, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = FrameStore::new(dir.path().join("v1.db"));
    store
        .open_scoped(|h| {
            for i in 0..n {
                h.put(&format!("k{i:02}"), &[i as u8; 40]);
            }
            Ok(())
        })
        .unwrap();
    (store, dir)
}

fn frames_in(req: &HttpRequest) -> u8 {
    req.body[PACKET_HEADER_LEN - 1]
}

#[test]
fn drain_sends_ceil_n_over_f_batches() {
    let (store, _dir) = seeded(7);
    let pipeline = UploadPipeline::new(&config(3));
    let mut http = ScriptedHttp::new(Box::new(|req| Ok(echo_checksum(req))));

    let outcome = pipeline.drain(&store, &mut http);

    assert_eq!(
        outcome,
        DrainOutcome::FullySynced {
            batches: 3,
            frames: 7
        }
    );
    let sizes: Vec<u8> = http.requests.iter().map(frames_in).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
    assert!(http.requests.iter().all(|r| r.url == URL));
    assert_eq!(store.count(), Some(0));
}

#[test]
fn batches_follow_key_order() {
    let (store, _dir) = seeded(4);
    let pipeline = UploadPipeline::new(&config(2));
    let mut http = ScriptedHttp::new(Box::new(|req| Ok(echo_checksum(req))));

    pipeline.drain(&store, &mut http);

    let first = &http.requests[0].body;
    assert_eq!(first[PACKET_HEADER_LEN], 0);
    assert_eq!(first[PACKET_HEADER_LEN + 40], 1);
    let second = &http.requests[1].body;
    assert_eq!(second[PACKET_HEADER_LEN], 2);
    assert_eq!(second.len(), PACKET_HEADER_LEN + 80 + CHECKSUM_LEN);
}

#[test]
fn checksum_off_by_one_byte_keeps_everything() {
    let (store, _dir) = seeded(2);
    let pipeline = UploadPipeline::new(&config(30));
    let mut http = ScriptedHttp::new(Box::new(|req| {
        let mut resp = echo_checksum(req);
        resp.body[CHECKSUM_LEN - 1] ^= 0x01;
        Ok(resp)
    }));

    let outcome = pipeline.drain(&store, &mut http);

    assert_eq!(
        outcome,
        DrainOutcome::PartialFailure {
            batches: 0,
            frames: 0,
            cause: Error::Protocol(ProtocolError::ChecksumMismatch),
        }
    );
    assert_eq!(http.requests.len(), 1);
    assert_eq!(store.count(), Some(2));
}

#[test]
fn failure_after_first_batch_keeps_the_rest() {
    let (store, _dir) = seeded(5);
    let pipeline = UploadPipeline::new(&config(2));
    let mut sent = 0;
    let mut http = ScriptedHttp::new(Box::new(move |req| {
        sent += 1;
        if sent == 1 {
            Ok(echo_checksum(req))
        } else {
            Err(NetworkError::Timeout)
        }
    }));

    let outcome = pipeline.drain(&store, &mut http);

    assert_eq!(
        outcome,
        DrainOutcome::PartialFailure {
            batches: 1,
            frames: 2,
            cause: Error::Network(NetworkError::Timeout),
        }
    );
    assert_eq!(store.count(), Some(3));
    let left = store
        .open_scoped(|h| Ok(h.iter().map(|(k, _)| k.to_owned()).collect::<Vec<_>>()))
        .unwrap();
    assert_eq!(left, vec!["k02", "k03", "k04"]);
}

#[test]
fn byte_limit_splits_batches() {
    let (store, _dir) = seeded(3);
    let cfg = NodeConfig {
        max_packet_size: 80,
        ..config(30)
    };
    let pipeline = UploadPipeline::new(&cfg);
    let mut http = ScriptedHttp::new(Box::new(|req| Ok(echo_checksum(req))));

    let outcome = pipeline.drain(&store, &mut http);

    assert_eq!(
        outcome,
        DrainOutcome::FullySynced {
            batches: 2,
            frames: 3
        }
    );
    let sizes: Vec<u8> = http.requests.iter().map(frames_in).collect();
    assert_eq!(sizes, vec![2, 1]);
}

#[test]
fn empty_store_sends_nothing() {
    let (store, _dir) = seeded(0);
    let pipeline = UploadPipeline::new(&config(30));
    let mut http = ScriptedHttp::new(Box::new(|_| Ok(HttpResponse::default())));

    assert_eq!(
        pipeline.drain(&store, &mut http),
        DrainOutcome::NoFramesAvailable
    );
    assert!(http.requests.is_empty());
}

#[test]
fn confirmed_batch_is_on_disk_before_next_send() {
    let (store, dir) = seeded(4);
    let path = dir.path().join("v1.db");
    let pipeline = UploadPipeline::new(&config(2));
    let mut sent = 0;
    let mut http = ScriptedHttp::new(Box::new(move |req| {
        sent += 1;
        if sent == 1 {
            return Ok(echo_checksum(req));
        }
        let on_disk = FrameStore::new(path.clone())
            .open_scoped(|h| Ok(h.iter().map(|(k, _)| k.to_owned()).collect::<Vec<_>>()))
            .unwrap();
        assert_eq!(on_disk, vec!["k02", "k03"]);
        Err(NetworkError::Timeout)
    }));

    let outcome = pipeline.drain(&store, &mut http);

    assert_eq!(
        outcome,
        DrainOutcome::PartialFailure {
            batches: 1,
            frames: 2,
            cause: Error::Network(NetworkError::Timeout),
        }
    );
    assert_eq!(http.requests.len(), 2);
    assert_eq!(store.count(), Some(2));
}

#[test]
fn unreadable_store_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = FrameStore::new(dir.path().to_path_buf());
    let pipeline = UploadPipeline::new(&config(30));
    let mut http = ScriptedHttp::new(Box::new(|req| Ok(echo_checksum(req))));

    let outcome = pipeline.drain(&store, &mut http);

    assert_eq!(
        outcome,
        DrainOutcome::PartialFailure {
            batches: 0,
            frames: 0,
            cause: Error::Storage(StorageError::Open),
        }
    );
    assert!(!outcome.store_is_clear());
    assert!(http.requests.is_empty());
}
