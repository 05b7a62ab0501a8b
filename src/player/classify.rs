use crate::error::ClassificationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Playback category derived from a file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlayCategory {
    Sid,
    Prg,
    Crt,
    DiskImage,
    Module,
    Unsupported,
}

const SID_EXTENSIONS: &[&str] = &["sid"];
const PRG_EXTENSIONS: &[&str] = &["prg"];
const CRT_EXTENSIONS: &[&str] = &["crt"];
const DISK_EXTENSIONS: &[&str] = &["d64", "d71", "d81", "g64", "g71"];
const MODULE_EXTENSIONS: &[&str] = &["mod", "xm", "s3m"];

impl PlayCategory {
    pub const PLAYABLE: [PlayCategory; 5] = [
        PlayCategory::Sid,
        PlayCategory::Prg,
        PlayCategory::Crt,
        PlayCategory::DiskImage,
        PlayCategory::Module,
    ];

    pub fn is_supported(self) -> bool {
        self != PlayCategory::Unsupported
    }

    pub fn label(self) -> &'static str {
        match self {
            PlayCategory::Sid => "SID",
            PlayCategory::Prg => "PRG",
            PlayCategory::Crt => "CRT",
            PlayCategory::DiskImage => "Disk",
            PlayCategory::Module => "MOD",
            PlayCategory::Unsupported => "Unsupported",
        }
    }
}

impl fmt::Display for PlayCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PlayCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sid" => Ok(PlayCategory::Sid),
            "prg" => Ok(PlayCategory::Prg),
            "crt" => Ok(PlayCategory::Crt),
            "disk" | "diskimage" | "d64" => Ok(PlayCategory::DiskImage),
            "mod" | "module" => Ok(PlayCategory::Module),
            other => Err(format!("Unknown category: {}", other)),
        }
    }
}

/// Lowercase extension of a file name, without the dot
pub fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

/// Map a filename to its playback category (case-insensitive, extension only)
pub fn classify(file_name: &str) -> PlayCategory {
    let Some(ext) = extension(file_name) else {
        return PlayCategory::Unsupported;
    };
    let ext = ext.as_str();

    if SID_EXTENSIONS.contains(&ext) {
        PlayCategory::Sid
    } else if PRG_EXTENSIONS.contains(&ext) {
        PlayCategory::Prg
    } else if CRT_EXTENSIONS.contains(&ext) {
        PlayCategory::Crt
    } else if DISK_EXTENSIONS.contains(&ext) {
        PlayCategory::DiskImage
    } else if MODULE_EXTENSIONS.contains(&ext) {
        PlayCategory::Module
    } else {
        PlayCategory::Unsupported
    }
}

pub fn require_supported(file_name: &str) -> Result<PlayCategory, ClassificationError> {
    match classify(file_name) {
        PlayCategory::Unsupported => Err(ClassificationError {
            file_name: file_name.to_string(),
        }),
        category => Ok(category),
    }
}

/// Result of scanning a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingScan<T> {
    Found(Vec<(T, PlayCategory)>),
    /// Only reported once the whole listing was scanned
    NoSupportedFiles,
}

/// Keep the playable entries of a listing; unsupported names are dropped silently.
pub fn filter_supported<T, F>(entries: impl IntoIterator<Item = T>, name: F) -> Vec<(T, PlayCategory)>
where
    F: Fn(&T) -> &str,
{
    entries
        .into_iter()
        .filter_map(|entry| {
            let category = classify(name(&entry));
            category.is_supported().then_some((entry, category))
        })
        .collect()
}

pub fn scan_listing<T, F>(entries: impl IntoIterator<Item = T>, name: F) -> ListingScan<T>
where
    F: Fn(&T) -> &str,
{
    let found = filter_supported(entries, name);
    if found.is_empty() {
        ListingScan::NoSupportedFiles
    } else {
        ListingScan::Found(found)
    }
}
