//! HVSC `Songlengths` database lookups.
//!
//! The file pairs a comment line holding the collection path with an
//! `md5=len len ...` line, one length per sub-tune:
//!
//! ```text
//! ; /MUSICIANS/H/Hubbard_Rob/Commando.sid
//! 2a1c94c6e5ed3c93b3d0f84a15e5a1c9=4:12 0:10 0:09
//! ```

use crate::error::PlayError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where the database usually sits inside an HVSC checkout
pub const CANDIDATES: &[&str] = &[
    "Songlengths.md5",
    "songlengths.md5",
    "Songlengths.txt",
    "songlengths.txt",
    "DOCUMENTS/Songlengths.md5",
    "DOCUMENTS/songlengths.md5",
    "DOCUMENTS/Songlengths.txt",
    "DOCUMENTS/songlengths.txt",
];

#[derive(Debug, Clone, Default)]
pub struct SongLengths {
    /// Normalized collection path → per-song lengths (ms)
    by_path: HashMap<String, Vec<u64>>,
    /// Lowercase file name → collection paths carrying that name
    by_name: HashMap<String, Vec<String>>,
}

fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/").to_ascii_lowercase();
    format!("/{}", path.trim_start_matches('/'))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// `m:ss`, `m:ss.fff` or `mm:ss`, with an optional `(G)`-style attribute suffix
pub fn parse_length(token: &str) -> Option<u64> {
    let token = token.split('(').next()?.trim();
    let (minutes, rest) = token.split_once(':')?;
    let (seconds, millis) = match rest.split_once('.') {
        Some((s, f)) => {
            let digits: String = f.chars().take(3).collect();
            let scale = 10u64.pow(3 - digits.len() as u32);
            (s, digits.parse::<u64>().ok()? * scale)
        }
        None => (rest, 0),
    };

    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    if seconds >= 60 {
        return None;
    }
    Some((minutes * 60 + seconds) * 1000 + millis)
}

impl SongLengths {
    pub fn parse(content: &str) -> Self {
        let mut db = Self::default();
        let mut pending: Option<String> = None;

        for (number, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(comment) = line.strip_prefix(';') {
                let comment = comment.trim();
                pending = (comment.starts_with('/') && comment.contains('.')).then(|| comment.to_string());
                continue;
            }

            let Some((hash, lengths)) = line.split_once('=') else {
                debug!(line = number + 1, "Skipping unrecognized songlengths line");
                continue;
            };
            if hash.len() != 32 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                continue;
            }

            let Some(path) = pending.take() else {
                continue;
            };
            let lengths: Vec<u64> = lengths.split_whitespace().filter_map(parse_length).collect();

            let key = normalize(&path);
            db.by_name
                .entry(file_name(&key).to_string())
                .or_default()
                .push(path);
            db.by_path.insert(key, lengths);
        }

        db
    }

    pub fn load(path: &Path) -> Result<Self, PlayError> {
        let content = fs::read(path).map_err(|e| PlayError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let db = Self::parse(&String::from_utf8_lossy(&content));
        info!(path = %path.display(), entries = db.len(), "Loaded songlengths");
        Ok(db)
    }

    /// Accept the database file itself or an HVSC root holding it
    pub fn locate(path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        CANDIDATES
            .iter()
            .map(|rel| path.join(rel))
            .find(|candidate| candidate.is_file())
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Collection paths sharing a file name
    pub fn paths_named(&self, name: &str) -> &[String] {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn lengths_for(&self, path: &str) -> Option<&Vec<u64>> {
        let key = normalize(path);
        if let Some(lengths) = self.by_path.get(&key) {
            return Some(lengths);
        }

        // Local or device paths carry a prefix before the collection root
        let suffix_hit = key
            .match_indices('/')
            .skip(1)
            .find_map(|(i, _)| self.by_path.get(&key[i..]));
        if suffix_hit.is_some() {
            return suffix_hit;
        }

        // Last resort: a file name that is unique in the collection
        match self.paths_named(file_name(&key)) {
            [only] => self.by_path.get(&normalize(only)),
            _ => None,
        }
    }

    /// Length of a sub-tune (1-based, default 1)
    pub fn lookup(&self, path: &str, song: Option<u16>) -> Option<u64> {
        let index = song.unwrap_or(1).max(1) as usize - 1;
        self.lengths_for(path)?.get(index).copied()
    }
}
