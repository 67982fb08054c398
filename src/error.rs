//! Unified error types for the sensor node firmware.
//!
//! One enum per failure class, mirroring how the wake cycle reacts to it:
//!
//! | Class       | Reaction                                              |
//! |-------------|-------------------------------------------------------|
//! | `Storage`   | logged, operation skipped, wake cycle continues       |
//! | `Network`   | current portal / upload attempt aborted               |
//! | `Protocol`  | same as `Network`; undeleted frames stay in the store |
//! | `Config`    | update rejected, current configuration keeps running  |
//!
//! All variants are `Copy` so they can be carried in events and drain
//! outcomes without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Storage(StorageError),
    Network(NetworkError),
    Protocol(ProtocolError),
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Network(e) => write!(f, "network: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Failures of the durable frame store or the NVS key-value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Backing file or partition could not be opened.
    Open,
    /// Read failed mid-way.
    Read,
    /// Write, rename or commit failed.
    Write,
    /// Persisted bytes failed the integrity check.
    Corrupt,
    /// Requested key does not exist.
    NotFound,
    /// Partition has no room left.
    Full,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open failed"),
            Self::Read => write!(f, "read failed"),
            Self::Write => write!(f, "write failed"),
            Self::Corrupt => write!(f, "stored data corrupt"),
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Network errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    /// Station is not associated with an access point.
    NotAssociated,
    /// Association did not complete within the connect timeout.
    AssociationTimeout,
    /// The HTTP client gave up waiting.
    Timeout,
    /// TCP connect refused or reset.
    ConnectionFailed,
    /// TLS handshake or certificate check failed.
    Tls,
    /// Any other transport-level failure (DNS, socket, client setup).
    Transport,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAssociated => write!(f, "not associated"),
            Self::AssociationTimeout => write!(f, "association timed out"),
            Self::Timeout => write!(f, "request timed out"),
            Self::ConnectionFailed => write!(f, "connection failed"),
            Self::Tls => write!(f, "TLS failure"),
            Self::Transport => write!(f, "transport failure"),
        }
    }
}

impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Self::Network(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

/// The peer answered, but not in the shape we expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Server echoed a checksum that differs from the one we sent.
    ChecksumMismatch,
    /// Response body was not valid JSON.
    MalformedJson,
    /// A JSON field was absent or had the wrong type.
    MissingField(&'static str),
    /// An expected HTML fragment was not found.
    MissingPattern(&'static str),
    /// An expected response header was absent.
    MissingHeader(&'static str),
    /// The provider accepted the login but granted too little validity.
    InsufficientValidity,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
            Self::MalformedJson => write!(f, "malformed JSON"),
            Self::MissingField(name) => write!(f, "missing field '{name}'"),
            Self::MissingPattern(what) => write!(f, "missing pattern: {what}"),
            Self::MissingHeader(name) => write!(f, "missing header '{name}'"),
            Self::InsufficientValidity => write!(f, "session validity too short"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// OTA artifact digest differs from the published digest.
    DigestMismatch,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::DigestMismatch => write!(f, "artifact digest mismatch"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl std::error::Error for StorageError {}
impl std::error::Error for NetworkError {}
impl std::error::Error for ProtocolError {}
impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
