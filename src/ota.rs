//! Configuration replacement over the air.
//!
//! Every `ota_interval` fully-synced drains the node fetches
//! `{ota_url}/config.json` together with its published SHA-256
//! (`{ota_url}/config.json.sha256`, `sha256sum` format). A digest mismatch
//! rejects the artifact and the running configuration stays in force; a
//! verified artifact is validated and persisted, taking effect on the next
//! wake.

use log::{info, warn};

use crate::app::ports::{ConfigPort, HttpPort, HttpRequest, StoragePort};
use crate::config::NodeConfig;
use crate::error::{ConfigError, Error, StorageError};

pub const OTA_NAMESPACE: &str = "ota";
/// Fully-synced drains since the last update attempt.
pub const SYNC_COUNT_KEY: &str = "syncs";

pub struct OtaConfigUpdater {
    base_url: String,
    interval: u8,
}

impl OtaConfigUpdater {
    pub fn new(cfg: &NodeConfig) -> Self {
        Self {
            base_url: cfg.ota_url.trim_end_matches('/').to_owned(),
            interval: cfg.ota_interval.max(1),
        }
    }

    pub fn artifact_url(&self) -> String {
        format!("{}/config.json", self.base_url)
    }

    pub fn digest_url(&self) -> String {
        format!("{}/config.json.sha256", self.base_url)
    }

    /// Count one fully-synced drain. Returns `true` when an update is due,
    /// in which case the count restarts from zero.
    pub fn record_sync(&self, storage: &mut impl StoragePort) -> bool {
        let mut buf = [0u8; 1];
        let count = match storage.read(OTA_NAMESPACE, SYNC_COUNT_KEY, &mut buf) {
            Ok(1) => buf[0],
            Ok(_) | Err(StorageError::NotFound) => 0,
            Err(e) => {
                warn!("OTA: sync count unreadable ({}), restarting count", e);
                0
            }
        }
        .saturating_add(1);

        let due = count >= self.interval;
        let next = if due { 0 } else { count };
        if let Err(e) = storage.write(OTA_NAMESPACE, SYNC_COUNT_KEY, &[next]) {
            warn!("OTA: failed to persist sync count ({})", e);
        }
        due
    }

    /// Download and verify the published configuration.
    pub fn fetch(&self, http: &mut dyn HttpPort) -> Result<NodeConfig, Error> {
        let artifact = http.execute(&HttpRequest::get(self.artifact_url()))?;
        let digest = http.execute(&HttpRequest::get(self.digest_url()))?;
        if artifact.status != 200 || digest.status != 200 {
            warn!(
                "OTA: artifact {} / digest {}",
                artifact.status, digest.status
            );
            return Err(ConfigError::NotFound.into());
        }

        verify_artifact(&artifact.body, &digest.text())?;

        let cfg: NodeConfig =
            serde_json::from_slice(&artifact.body).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fetch, verify and persist a new configuration.
    pub fn update(
        &self,
        http: &mut dyn HttpPort,
        config: &impl ConfigPort,
    ) -> Result<NodeConfig, Error> {
        info!("OTA: checking {}", self.artifact_url());
        let cfg = self.fetch(http)?;
        config.save(&cfg)?;
        info!("OTA: new configuration stored, applies on next wake");
        Ok(cfg)
    }
}

/// Compare the artifact's SHA-256 against a published hex digest. Only the
/// first whitespace-separated token of `published` is considered.
pub fn verify_artifact(artifact: &[u8], published: &str) -> Result<(), ConfigError> {
    let expected = published.split_whitespace().next().unwrap_or_default();
    let actual = to_hex(&hmac_sha256::Hash::hash(artifact));
    if expected.eq_ignore_ascii_case(&actual) {
        Ok(())
    } else {
        Err(ConfigError::DigestMismatch)
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
