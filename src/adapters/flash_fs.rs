//! Flash filesystem holding the frame store file.
//!
//! On the device the `storage` SPIFFS partition is mounted at [`MOUNT_POINT`]
//! through the ESP-IDF VFS, formatting it on first use. Off-target a local
//! directory stands in for the partition.

use std::path::{Path, PathBuf};

#[allow(unused_imports)]
use log::{info, warn};

use crate::error::StorageError;
use crate::store::DEFAULT_STORE_FILE;

pub const MOUNT_POINT: &str = "/data";

#[allow(dead_code)]
const MAX_OPEN_FILES: usize = 4;

pub struct FlashFs {
    root: PathBuf,
}

impl FlashFs {
    /// Mount the SPIFFS partition. Idempotent across wakes since each wake
    /// is a fresh boot.
    #[cfg(target_os = "espidf")]
    pub fn mount() -> Result<Self, StorageError> {
        use esp_idf_svc::sys::*;

        let conf = esp_vfs_spiffs_conf_t {
            base_path: c"/data".as_ptr(),
            partition_label: c"storage".as_ptr(),
            max_files: MAX_OPEN_FILES,
            format_if_mount_failed: true,
        };
        // SAFETY: conf and its C strings outlive the call; single-threaded boot.
        let ret = unsafe { esp_vfs_spiffs_register(&conf) };
        if ret != ESP_OK as esp_err_t {
            warn!("FlashFs: SPIFFS mount failed ({})", ret);
            return Err(StorageError::Open);
        }

        let (mut total, mut used) = (0usize, 0usize);
        if unsafe { esp_spiffs_info(conf.partition_label, &mut total, &mut used) }
            == ESP_OK as esp_err_t
        {
            info!("FlashFs: mounted {} ({} / {} bytes used)", MOUNT_POINT, used, total);
        }
        Ok(Self {
            root: PathBuf::from(MOUNT_POINT),
        })
    }

    /// Use `root` as the filesystem, creating it if needed.
    #[cfg(not(target_os = "espidf"))]
    pub fn mount_at(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|_| StorageError::Open)?;
        info!("FlashFs(sim): using {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the frame store file on this filesystem.
    pub fn store_path(&self) -> PathBuf {
        self.root.join(DEFAULT_STORE_FILE)
    }
}
