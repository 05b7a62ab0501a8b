//! Error types for the playback core.
//!
//! Each failure class keeps its own type so callers can pick the handling
//! policy: classification and disk errors are recovered locally, device errors
//! are surfaced, audio sync errors are logged.

use thiserror::Error;

/// A filename whose extension maps to no playable category.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported file type: {file_name}")]
pub struct ClassificationError {
    pub file_name: String,
}

/// Disk image could not be decoded for fast-start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiskParseError {
    #[error("Unsupported disk image type: {0}")]
    UnsupportedType(String),

    #[error("Unsupported {kind} image size: {size} bytes")]
    UnsupportedSize { kind: &'static str, size: usize },

    #[error("Track {track} sector {sector} is outside the disk geometry")]
    OutOfRange { track: u8, sector: u8 },

    #[error("Short sector read at track {track} sector {sector}")]
    ShortSector { track: u8, sector: u8 },

    #[error("No closed PRG entry in the directory")]
    NoProgram,

    #[error("Sector chain loops at track {track} sector {sector}")]
    ChainLoop { track: u8, sector: u8 },

    #[error("Program is too small ({0} bytes)")]
    TooSmall(usize),

    #[error("Program at ${load_address:04X} ({length} bytes) does not fit in memory")]
    LoadRange { load_address: u16, length: usize },
}

/// A device command failed. Timeouts, HTTP status failures and transport
/// failures stay distinct so callers can report them differently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommandError {
    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("{operation} failed with HTTP {status}: {message}")]
    Status {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("{operation} failed: {message}")]
    Network { operation: String, message: String },

    #[error("{operation} returned an unexpected response: {message}")]
    Protocol { operation: String, message: String },

    #[error("Memory at ${address:04X} did not settle after {attempts} reads")]
    NotReady { address: u16, attempts: u32 },
}

/// Mute/restore or a live volume edit could not be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioSyncError {
    #[error("Failed to read {item}: {source}")]
    Read {
        item: String,
        #[source]
        source: DeviceCommandError,
    },

    #[error("Failed to write {count} mixer value(s): {source}")]
    Write {
        count: usize,
        #[source]
        source: DeviceCommandError,
    },

    #[error("Unknown mixer channel: {0}")]
    UnknownChannel(String),
}

/// Errors surfaced by the playback session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error("Local file {path} has no content loaded")]
    MissingBytes { path: String },

    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Step {index} ({step}) failed: {source}")]
    Step {
        index: usize,
        step: &'static str,
        #[source]
        source: DeviceCommandError,
    },

    #[error("Queue has no item at index {0}")]
    NoSuchItem(usize),
}

impl PlayError {
    /// The device error behind a failed plan step, if any.
    pub fn device_error(&self) -> Option<&DeviceCommandError> {
        match self {
            PlayError::Step { source, .. } => Some(source),
            _ => None,
        }
    }
}
