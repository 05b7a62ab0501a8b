//! Commodore floppy image decoding 💾
//!
//! Just enough of the CBM DOS layout to find the first closed PRG in the
//! directory and pull it off its sector chain, so a program can be written
//! straight into memory instead of going through the KERNAL loader.

use crate::error::DiskParseError;
use std::collections::HashSet;

pub type Result<T> = std::result::Result<T, DiskParseError>;

pub const SECTOR_SIZE: usize = 256;
/// Payload bytes per sector after the (track, sector) link
pub const SECTOR_PAYLOAD: usize = SECTOR_SIZE - 2;
pub const DIRECTORY_ENTRY_SIZE: usize = 32;
pub const ENTRIES_PER_SECTOR: usize = 8;

const FILE_TYPE_MASK: u8 = 0x0F;
const FILE_TYPE_PRG: u8 = 0x02;
const FILE_CLOSED: u8 = 0x80;
const NAME_PADDING: u8 = 0xA0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskFormat {
    D64,
    D71,
    D81,
}

impl DiskFormat {
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "d64" => Ok(DiskFormat::D64),
            "d71" => Ok(DiskFormat::D71),
            "d81" => Ok(DiskFormat::D81),
            other => Err(DiskParseError::UnsupportedType(other.to_string())),
        }
    }

    fn name(self) -> &'static str {
        match self {
            DiskFormat::D64 => "D64",
            DiskFormat::D71 => "D71",
            DiskFormat::D81 => "D81",
        }
    }
}

/// 1541 speed zones: 21/19/18/17 sectors per track
pub fn sectors_per_track_1541(track: u8) -> u8 {
    match track {
        0..=17 => 21,
        18..=24 => 19,
        25..=30 => 18,
        _ => 17,
    }
}

/// Geometry of one image: sector counts per track and where the directory starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskLayout {
    pub format: DiskFormat,
    pub tracks: u8,
    pub directory_track: u8,
    pub directory_sector: u8,
    pub has_error_table: bool,
    /// `track_starts[t - 1]` = sectors preceding track `t`; last entry is the total
    track_starts: Vec<usize>,
}

impl DiskLayout {
    fn build(format: DiskFormat, tracks: u8, has_error_table: bool) -> Self {
        let (directory_track, directory_sector) = match format {
            DiskFormat::D64 | DiskFormat::D71 => (18, 1),
            DiskFormat::D81 => (40, 3),
        };

        let mut track_starts = Vec::with_capacity(tracks as usize + 1);
        let mut total = 0usize;
        track_starts.push(0);
        for track in 1..=tracks {
            total += Self::zone_sectors(format, track) as usize;
            track_starts.push(total);
        }

        Self {
            format,
            tracks,
            directory_track,
            directory_sector,
            has_error_table,
            track_starts,
        }
    }

    fn zone_sectors(format: DiskFormat, track: u8) -> u8 {
        match format {
            DiskFormat::D64 => sectors_per_track_1541(track),
            // Second side of a 1571 repeats the 1541 zones
            DiskFormat::D71 => sectors_per_track_1541((track - 1) % 35 + 1),
            DiskFormat::D81 => 40,
        }
    }

    /// Standard 35-track single-sided 1541 layout
    pub fn d64() -> Self {
        Self::build(DiskFormat::D64, 35, false)
    }

    /// Pick the layout whose size (with or without error table) matches the file
    pub fn detect(format: DiskFormat, size: usize) -> Result<Self> {
        let track_options: &[u8] = match format {
            DiskFormat::D64 => &[35, 40],
            DiskFormat::D71 => &[70],
            DiskFormat::D81 => &[80],
        };

        for &tracks in track_options {
            let layout = Self::build(format, tracks, false);
            let base = layout.total_sectors() * SECTOR_SIZE;
            if size == base {
                return Ok(layout);
            }
            if size == base + layout.total_sectors() {
                return Ok(Self::build(format, tracks, true));
            }
        }

        Err(DiskParseError::UnsupportedSize {
            kind: format.name(),
            size,
        })
    }

    pub fn total_sectors(&self) -> usize {
        self.track_starts.last().copied().unwrap_or(0)
    }

    /// Sectors on `track`; 0 for tracks the image does not have
    pub fn sectors_per_track(&self, track: u8) -> u8 {
        if track == 0 || track > self.tracks {
            return 0;
        }
        Self::zone_sectors(self.format, track)
    }

    /// Byte offset of (track, sector): `256 × (sectors before track + sector)`
    pub fn offset(&self, track: u8, sector: u8) -> Result<usize> {
        if track == 0 || track > self.tracks || sector >= self.sectors_per_track(track) {
            return Err(DiskParseError::OutOfRange { track, sector });
        }
        Ok((self.track_starts[track as usize - 1] + sector as usize) * SECTOR_SIZE)
    }
}

/// One 32-byte directory record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub file_type: u8,
    pub first_track: u8,
    pub first_sector: u8,
    pub name: String,
    pub blocks: u16,
}

impl DirectoryEntry {
    fn parse(raw: &[u8]) -> Self {
        Self {
            file_type: raw[0],
            first_track: raw[1],
            first_sector: raw[2],
            name: decode_name(&raw[3..19]),
            blocks: u16::from_le_bytes([raw[28], raw[29]]),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.file_type & FILE_CLOSED != 0
    }

    pub fn is_program(&self) -> bool {
        self.file_type & FILE_TYPE_MASK == FILE_TYPE_PRG
    }

    /// Closed, non-empty PRG with a real sector chain
    pub fn is_runnable(&self) -> bool {
        self.is_closed() && self.is_program() && self.first_track != 0 && self.blocks > 0
    }
}

/// PETSCII name, 0xA0-padded; Latin-1 is close enough for display
fn decode_name(raw: &[u8]) -> String {
    let text: String = raw
        .iter()
        .map(|&b| if b == NAME_PADDING { ' ' } else { b as char })
        .collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A program pulled off a disk: load address plus the bytes that follow it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedProgram {
    pub name: String,
    pub load_address: u16,
    pub payload: Vec<u8>,
}

impl ExtractedProgram {
    /// First address after the program
    pub fn end_address(&self) -> u32 {
        self.load_address as u32 + self.payload.len() as u32
    }

    /// The program as a `.prg` file (load address prefix included)
    pub fn to_prg_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + 2);
        out.extend_from_slice(&self.load_address.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Parsed image. Immutable; everything is derived from the input bytes.
#[derive(Debug, Clone)]
pub struct DiskImage {
    layout: DiskLayout,
    data: Vec<u8>,
}

impl DiskImage {
    pub fn parse(format: DiskFormat, bytes: &[u8]) -> Result<Self> {
        let layout = DiskLayout::detect(format, bytes.len())?;
        // Error table (one status byte per sector) trails the sector data
        let data = bytes[..layout.total_sectors() * SECTOR_SIZE].to_vec();
        Ok(Self { layout, data })
    }

    /// Parse using the file extension to pick the format (`.g64` and friends fail)
    pub fn from_file_name(file_name: &str, bytes: &[u8]) -> Result<Self> {
        let ext = crate::player::classify::extension(file_name).unwrap_or_default();
        Self::parse(DiskFormat::from_extension(&ext)?, bytes)
    }

    pub fn layout(&self) -> &DiskLayout {
        &self.layout
    }

    pub fn sector(&self, track: u8, sector: u8) -> Result<&[u8]> {
        let offset = self.layout.offset(track, sector)?;
        self.data
            .get(offset..offset + SECTOR_SIZE)
            .ok_or(DiskParseError::ShortSector { track, sector })
    }

    /// Walk the directory chain. A looping chain just ends the listing.
    pub fn directory(&self) -> Result<Vec<DirectoryEntry>> {
        let mut entries = Vec::new();
        let mut visited = HashSet::new();
        let (mut track, mut sector) = (self.layout.directory_track, self.layout.directory_sector);

        while track != 0 && visited.insert((track, sector)) {
            let data = self.sector(track, sector)?;
            for index in 0..ENTRIES_PER_SECTOR {
                let start = 2 + index * DIRECTORY_ENTRY_SIZE;
                // The last slot is cut short by the sector end
                let Some(raw) = data.get(start..(start + DIRECTORY_ENTRY_SIZE).min(SECTOR_SIZE)) else {
                    continue;
                };
                if raw[0] != 0 {
                    entries.push(DirectoryEntry::parse(raw));
                }
            }
            track = data[0];
            sector = data[1];
        }

        Ok(entries)
    }

    pub fn first_program(&self) -> Result<DirectoryEntry> {
        self.directory()?
            .into_iter()
            .find(DirectoryEntry::is_runnable)
            .ok_or(DiskParseError::NoProgram)
    }

    /// Concatenate the payload of a file's sector chain
    pub fn read_chain(&self, first_track: u8, first_sector: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let (mut track, mut sector) = (first_track, first_sector);

        while track != 0 {
            if !visited.insert((track, sector)) {
                return Err(DiskParseError::ChainLoop { track, sector });
            }
            let data = self.sector(track, sector)?;
            let (next_track, next_sector) = (data[0], data[1]);

            if next_track == 0 {
                // Terminal sector: second byte counts the valid payload bytes
                let used = match next_sector as usize {
                    0 => SECTOR_PAYLOAD,
                    n if n > SECTOR_PAYLOAD => SECTOR_PAYLOAD,
                    n => n,
                };
                out.extend_from_slice(&data[2..2 + used]);
                break;
            }

            out.extend_from_slice(&data[2..]);
            track = next_track;
            sector = next_sector;
        }

        Ok(out)
    }

    pub fn extract_first_program(&self) -> Result<ExtractedProgram> {
        let entry = self.first_program()?;
        let chain = self.read_chain(entry.first_track, entry.first_sector)?;
        if chain.len() < 2 {
            return Err(DiskParseError::TooSmall(chain.len()));
        }

        Ok(ExtractedProgram {
            name: entry.name,
            load_address: u16::from_le_bytes([chain[0], chain[1]]),
            payload: chain[2..].to_vec(),
        })
    }
}

/// Decode `bytes` as the image named `file_name` and return its first program
pub fn extract_first_program(file_name: &str, bytes: &[u8]) -> Result<ExtractedProgram> {
    DiskImage::from_file_name(file_name, bytes)?.extract_first_program()
}
