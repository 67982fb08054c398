//! Durable, content-addressed frame store.
//!
//! Lives in one file on the flash filesystem and survives cold boot and
//! brownout. The file is opened lazily for each access through
//! [`FrameStore::open_scoped`], which hands the caller a [`StoreHandle`] and
//! guarantees a flush-and-close on every exit path.
//!
//! ## File format
//!
//! ```text
//! ┌──────────────────────────────────────────┬──────────────┐
//! │ postcard(BTreeMap<String, Vec<u8>>)      │ crc32 (LE)   │
//! └──────────────────────────────────────────┴──────────────┘
//! ```
//!
//! Keys iterate in lexicographic order, not insertion order. A missing,
//! truncated or CRC-failing file opens as a fresh empty store.
//!
//! Writes go to `<path>.tmp`; the live file is removed and the temp file
//! renamed into its place. If the live file is missing on open, a valid
//! temp file left by an interrupted commit is adopted.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::StorageError;
use crate::frame::{CRC32, Frame};

const TRAILER_LEN: usize = 4;

/// Store file location on the flash filesystem.
pub const DEFAULT_STORE_FILE: &str = "v1.db";

pub struct FrameStore {
    path: PathBuf,
}

impl FrameStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the backing file, run `f` with the handle, then flush and close.
    ///
    /// The flush also happens if `f` returns an error or panics (via
    /// [`StoreHandle`]'s `Drop`).
    pub fn open_scoped<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut StoreHandle) -> Result<T, StorageError>,
    {
        let mut handle = StoreHandle::open(&self.path)?;
        let result = f(&mut handle);
        let closed = handle.close();
        match (result, closed) {
            (Ok(v), Ok(())) => Ok(v),
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
        }
    }

    /// Store `frame` under its content-addressed key.
    ///
    /// Storage failures are logged and swallowed; losing one frame is an
    /// accepted degradation, never a reason to abort the wake cycle.
    pub fn put_frame(&self, frame: &Frame) -> Option<String> {
        let key = frame.key();
        match self.open_scoped(|h| {
            h.put(&key, frame.as_bytes());
            Ok(())
        }) {
            Ok(()) => Some(key),
            Err(e) => {
                warn!("Store: failed to store frame {} ({})", key, e);
                None
            }
        }
    }

    /// Number of stored frames, or `None` if the store cannot be opened.
    pub fn count(&self) -> Option<usize> {
        self.open_scoped(|h| Ok(h.len())).ok()
    }
}

/// Open store contents. Mutations are buffered until [`flush`](Self::flush).
pub struct StoreHandle {
    path: PathBuf,
    entries: BTreeMap<String, Vec<u8>>,
    dirty: bool,
    closed: bool,
}

impl StoreHandle {
    fn open(path: &Path) -> Result<Self, StorageError> {
        let mut dirty = false;
        let entries = match read_image(path)? {
            Some(map) => map,
            None => match read_image(&tmp_path(path)) {
                // Power was lost between removing the live file and the rename.
                Ok(Some(map)) => {
                    warn!("Store: recovered {} entries from {}", map.len(), tmp_path(path).display());
                    dirty = true;
                    map
                }
                _ => {
                    info!("Store: {} absent or unreadable, starting fresh", path.display());
                    BTreeMap::new()
                }
            },
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
            dirty,
            closed: false,
        })
    }

    /// Upsert. An existing entry under `key` is overwritten.
    pub fn put(&mut self, key: &str, bytes: &[u8]) {
        self.entries.insert(key.to_owned(), bytes.to_vec());
        self.dirty = true;
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Remove one entry. Absent keys are a no-op.
    pub fn delete(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.dirty = true;
        }
    }

    /// Lazy walk in key order. Calling it again restarts from the first key
    /// still present.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist pending mutations to durable media.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if !self.dirty {
            return Ok(());
        }
        let raw = encode(&self.entries)?;
        let tmp = tmp_path(&self.path);
        fs::write(&tmp, &raw).map_err(|e| {
            warn!("Store: write {} failed: {}", tmp.display(), e);
            StorageError::Write
        })?;
        // SPIFFS rename refuses an existing target.
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Store: remove {} failed: {}", self.path.display(), e);
                return Err(StorageError::Write);
            }
        }
        fs::rename(&tmp, &self.path).map_err(|e| {
            warn!("Store: rename onto {} failed: {}", self.path.display(), e);
            StorageError::Write
        })?;
        self.dirty = false;
        debug!("Store: flushed {} entries ({} bytes)", self.entries.len(), raw.len());
        Ok(())
    }

    fn close(mut self) -> Result<(), StorageError> {
        self.closed = true;
        self.flush()
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.flush() {
                warn!("Store: flush on unwind failed ({})", e);
            }
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension("db.tmp")
}

/// Decoded contents of `path`, or `None` when it is absent or corrupt.
fn read_image(path: &Path) -> Result<Option<BTreeMap<String, Vec<u8>>>, StorageError> {
    match fs::read(path) {
        Ok(raw) => match decode(&raw) {
            Ok(map) => Ok(Some(map)),
            Err(e) => {
                warn!("Store: {} unreadable ({})", path.display(), e);
                Ok(None)
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => {
            warn!("Store: open {} failed: {}", path.display(), e);
            Err(StorageError::Open)
        }
    }
}

fn encode(entries: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>, StorageError> {
    let mut raw = postcard::to_allocvec(entries).map_err(|_| StorageError::Write)?;
    let crc = CRC32.checksum(&raw);
    raw.extend_from_slice(&crc.to_le_bytes());
    Ok(raw)
}

/// Decode a store file image. Public for the fuzz harness.
pub fn decode(raw: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, StorageError> {
    if raw.len() < TRAILER_LEN {
        return Err(StorageError::Corrupt);
    }
    let (body, trailer) = raw.split_at(raw.len() - TRAILER_LEN);
    let mut crc = [0u8; TRAILER_LEN];
    crc.copy_from_slice(trailer);
    if CRC32.checksum(body) != u32::from_le_bytes(crc) {
        return Err(StorageError::Corrupt);
    }
    postcard::from_bytes(body).map_err(|_| StorageError::Corrupt)
}
