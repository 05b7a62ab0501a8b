use crate::error::DeviceCommandError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type DeviceResult<T> = Result<T, DeviceCommandError>;

/// Transport state of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayerState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

/// One of the two virtual floppy drives 💾
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Drive {
    #[default]
    A,
    B,
}

impl Drive {
    /// Lowercase id used in REST paths (`/v1/drives/a:mount`)
    pub fn id(self) -> &'static str {
        match self {
            Drive::A => "a",
            Drive::B => "b",
        }
    }

    /// IEC bus device number the KERNAL uses for this drive
    pub fn device_number(self) -> u8 {
        match self {
            Drive::A => 8,
            Drive::B => 9,
        }
    }
}

impl fmt::Display for Drive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Drive::A => "A",
            Drive::B => "B",
        })
    }
}

/// Device-side runner that starts a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Runner {
    SidPlay,
    ModPlay,
    RunPrg,
    RunCrt,
}

impl Runner {
    pub fn endpoint(self) -> &'static str {
        match self {
            Runner::SidPlay => "sidplay",
            Runner::ModPlay => "modplay",
            Runner::RunPrg => "run_prg",
            Runner::RunCrt => "run_crt",
        }
    }
}

/// Where the device gets file content from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Path on the device's own filesystem
    Remote(String),
    /// Bytes uploaded with the request
    Upload { name: String, bytes: Vec<u8> },
}

impl MediaSource {
    pub fn name(&self) -> &str {
        match self {
            MediaSource::Remote(path) => path.rsplit('/').next().unwrap_or(path),
            MediaSource::Upload { name, .. } => name,
        }
    }
}

/// The vendor command contract of the device 🎛️
///
/// Every call is one request; implementations never retry. Futures are not
/// required to be `Send`: the session drives them from a single thread.
#[allow(async_fn_in_trait)]
pub trait DeviceCommands {
    async fn drive_on(&self, drive: Drive) -> DeviceResult<()>;
    async fn mount(&self, drive: Drive, image: &MediaSource) -> DeviceResult<()>;
    async fn reboot(&self) -> DeviceResult<()>;
    async fn reset(&self) -> DeviceResult<()>;
    async fn pause(&self) -> DeviceResult<()>;
    async fn resume(&self) -> DeviceResult<()>;
    async fn read_memory(&self, address: u16, length: u16) -> DeviceResult<Vec<u8>>;
    async fn write_memory(&self, address: u16, bytes: &[u8]) -> DeviceResult<()>;
    async fn run(&self, runner: Runner, media: &MediaSource, song: Option<u16>)
        -> DeviceResult<()>;

    async fn get_config(&self, category: &str, item: &str) -> DeviceResult<String>;
    async fn set_config(&self, category: &str, item: &str, value: &str) -> DeviceResult<()>;
    async fn batch_set_config(&self, category: &str, items: &[(String, String)])
        -> DeviceResult<()>;
}
