//! Chunked, checksum-verified upload of stored frames.
//!
//! Packet layout:
//!
//! ```text
//! "CWA" version:u8 client_id:u16(BE) frame_count:u8 frames… sha256:[u8;32]
//! ```
//!
//! The server echoes the 32-byte digest as the response body. Frames are
//! deleted from the store only after a byte-exact echo. A mismatch or any
//! transport failure aborts the drain; nothing is retried until the next
//! wake.

use log::{info, warn};

use crate::app::ports::{HttpPort, HttpRequest};
use crate::config::NodeConfig;
use crate::error::{Error, ProtocolError};
use crate::store::{FrameStore, StoreHandle};

pub const PACKET_MAGIC: &[u8; 3] = b"CWA";
pub const PACKET_VERSION: u8 = 1;
pub const PACKET_HEADER_LEN: usize = 7;
pub const CHECKSUM_LEN: usize = 32;

pub type Checksum = [u8; CHECKSUM_LEN];

/// One serialized upload packet, checksum included.
#[derive(Debug, Clone)]
pub struct UploadPacket {
    bytes: Vec<u8>,
    checksum: Checksum,
}

impl UploadPacket {
    /// `frames.len()` must not exceed 255; [`BatchLimits`] guarantees that.
    pub fn build<'a>(client_id: u16, frames: impl ExactSizeIterator<Item = &'a [u8]>) -> Self {
        let count = frames.len().min(u8::MAX as usize) as u8;
        let mut bytes = Vec::with_capacity(PACKET_HEADER_LEN + CHECKSUM_LEN);
        bytes.extend_from_slice(PACKET_MAGIC);
        bytes.push(PACKET_VERSION);
        bytes.extend_from_slice(&client_id.to_be_bytes());
        bytes.push(count);
        for frame in frames.take(count as usize) {
            bytes.extend_from_slice(frame);
        }
        let checksum = hmac_sha256::Hash::hash(&bytes);
        bytes.extend_from_slice(&checksum);
        Self { bytes, checksum }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    pub fn frame_count(&self) -> u8 {
        self.bytes[PACKET_HEADER_LEN - 1]
    }
}

/// Size and count bounds for one packet.
///
/// A candidate is admitted when the batch *including it* stays at or under
/// both limits, so a batch may land exactly on either limit. The first frame
/// of an empty batch is always admitted, even when it alone is oversized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_bytes: usize,
    pub max_frames: usize,
}

impl BatchLimits {
    pub fn from_config(cfg: &NodeConfig) -> Self {
        Self {
            max_bytes: cfg.max_packet_size as usize,
            max_frames: (cfg.max_frames_per_packet as usize).max(1),
        }
    }

    pub fn admits(&self, batch_bytes: usize, batch_frames: usize, candidate_len: usize) -> bool {
        if batch_frames == 0 {
            return true;
        }
        batch_frames < self.max_frames && batch_bytes + candidate_len <= self.max_bytes
    }
}

/// Select the next batch from the head of the store's iteration order.
/// Returns the keys of the admitted frames.
pub fn next_batch(handle: &StoreHandle, limits: BatchLimits) -> Vec<String> {
    let mut keys = Vec::new();
    let mut bytes = 0usize;
    for (key, frame) in handle.iter() {
        if !limits.admits(bytes, keys.len(), frame.len()) {
            break;
        }
        bytes += frame.len();
        keys.push(key.to_owned());
    }
    keys
}

/// Result of one [`UploadPipeline::drain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every batch was confirmed and the store is now empty.
    FullySynced { batches: usize, frames: usize },
    /// A batch failed; `batches`/`frames` count what was confirmed before it.
    PartialFailure {
        batches: usize,
        frames: usize,
        cause: Error,
    },
    /// The store opened and holds no frames.
    NoFramesAvailable,
}

impl DrainOutcome {
    pub fn is_fully_synced(&self) -> bool {
        matches!(self, Self::FullySynced { .. })
    }

    /// `true` when nothing is left in the store after the drain.
    pub fn store_is_clear(&self) -> bool {
        matches!(self, Self::FullySynced { .. } | Self::NoFramesAvailable)
    }
}

pub struct UploadPipeline {
    client_id: u16,
    upload_url: String,
    limits: BatchLimits,
}

impl UploadPipeline {
    pub fn new(cfg: &NodeConfig) -> Self {
        Self {
            client_id: cfg.client_id,
            upload_url: cfg.upload_url.clone(),
            limits: BatchLimits::from_config(cfg),
        }
    }

    /// Upload and delete stored frames until the store is empty or a batch
    /// fails. `http` must already have egress.
    pub fn drain(&self, store: &FrameStore, http: &mut dyn HttpPort) -> DrainOutcome {
        let mut outcome = DrainOutcome::NoFramesAvailable;
        let result = store.open_scoped(|h| {
            outcome = self.drain_open(h, http);
            Ok(())
        });
        match result {
            Ok(()) => outcome,
            Err(e) => {
                warn!("Upload: store access failed ({})", e);
                match outcome {
                    DrainOutcome::PartialFailure { .. } => outcome,
                    DrainOutcome::FullySynced { batches, frames } => DrainOutcome::PartialFailure {
                        batches,
                        frames,
                        cause: e.into(),
                    },
                    DrainOutcome::NoFramesAvailable => DrainOutcome::PartialFailure {
                        batches: 0,
                        frames: 0,
                        cause: e.into(),
                    },
                }
            }
        }
    }

    fn drain_open(&self, handle: &mut StoreHandle, http: &mut dyn HttpPort) -> DrainOutcome {
        if handle.is_empty() {
            info!("Upload: store empty, nothing to send");
            return DrainOutcome::NoFramesAvailable;
        }

        let mut batches = 0usize;
        let mut frames = 0usize;
        loop {
            let keys = next_batch(handle, self.limits);
            if keys.is_empty() {
                info!("Upload: synced {} frames in {} batches", frames, batches);
                return DrainOutcome::FullySynced { batches, frames };
            }

            let packet = UploadPacket::build(
                self.client_id,
                keys.iter()
                    .map(|k| handle.get(k).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .into_iter(),
            );

            if let Err(cause) = self.send(http, &packet) {
                warn!(
                    "Upload: batch {} failed ({}), {} frames left for next wake",
                    batches + 1,
                    cause,
                    handle.len()
                );
                return DrainOutcome::PartialFailure {
                    batches,
                    frames,
                    cause,
                };
            }

            for key in &keys {
                handle.delete(key);
            }
            if let Err(e) = handle.flush() {
                warn!("Upload: flush after batch failed ({})", e);
            }
            batches += 1;
            frames += keys.len();
        }
    }

    fn send(&self, http: &mut dyn HttpPort, packet: &UploadPacket) -> Result<(), Error> {
        info!(
            "Upload: sending {} frames ({} bytes)",
            packet.frame_count(),
            packet.as_bytes().len()
        );
        let request = HttpRequest::post(self.upload_url.as_str(), packet.as_bytes())
            .header("Content-Type", "application/octet-stream");
        let response = http.execute(&request)?;
        if response.body.as_slice() != packet.checksum().as_slice() {
            return Err(ProtocolError::ChecksumMismatch.into());
        }
        Ok(())
    }
}
