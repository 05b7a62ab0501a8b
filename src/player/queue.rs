//! Playlist queue: ordering, navigation, shuffle/repeat, filters and time totals.
//!
//! Every transition runs against a clone of the state and swaps it in with a
//! single assignment, so a reader never sees a half-applied reorder.

use super::classify::PlayCategory;
use super::plan::{Origin, PlayRequest};
use super::traits::PlayerState;
use crate::error::PlayError;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Fallback when neither metadata nor the user supplied a duration (3 minutes)
pub const DEFAULT_DURATION_MS: u64 = 180_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: u64,
    pub origin: Origin,
    pub path: String,
    pub name: String,
    pub category: PlayCategory,
    /// From metadata (songlengths); the only field updated after insertion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_override_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song: Option<u16>,
    /// Listing or folder the item was added from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl QueueItem {
    /// Request to replay this item. Local bytes are loaded by the caller.
    pub fn to_request(&self) -> PlayRequest {
        let request = match self.origin {
            Origin::Local => PlayRequest {
                bytes: None,
                ..PlayRequest::local(self.path.clone(), Vec::new())
            },
            Origin::Remote => PlayRequest::remote(self.path.clone()),
        };
        request
            .with_song(self.song)
            .with_duration_override(self.duration_override_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueState {
    pub items: Vec<QueueItem>,
    pub current: Option<usize>,
    pub shuffle: bool,
    pub repeat: bool,
    /// Categories hidden from navigation and totals
    pub hidden: BTreeSet<PlayCategory>,
    pub transport: PlayerState,
    pub elapsed_ms: u64,
}

impl QueueState {
    pub fn is_visible(&self, index: usize) -> bool {
        self.items
            .get(index)
            .is_some_and(|item| !self.hidden.contains(&item.category))
    }

    pub fn visible_indices(&self) -> Vec<usize> {
        (0..self.items.len()).filter(|&i| self.is_visible(i)).collect()
    }

    fn start(&mut self, index: usize) {
        self.current = Some(index);
        self.transport = PlayerState::Playing;
        self.elapsed_ms = 0;
    }

    fn stop(&mut self) {
        self.transport = PlayerState::Stopped;
        self.elapsed_ms = 0;
    }
}

/// Result of a navigation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Start the item at this index
    Play(usize),
    /// Ran off the end without repeat; issue a stop
    Stopped,
    /// Nothing to do
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub item: QueueItem,
    /// The playing item was removed; playback has to stop
    pub was_current: bool,
}

/// Derived time totals in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueTotals {
    pub total_ms: u64,
    pub played_ms: u64,
    pub remaining_ms: u64,
}

impl QueueTotals {
    /// `(Total, Played, Remaining)` formatted for display
    pub fn formatted(&self) -> (String, String, String) {
        (
            format_duration(self.total_ms),
            format_duration(self.played_ms),
            format_duration(self.remaining_ms),
        )
    }
}

/// `m:ss`, or `h:mm:ss` from one hour up
pub fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", secs / 60, s)
    }
}

/// Queue as stored in `state.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedQueue {
    #[serde(default)]
    pub items: Vec<QueueItem>,
    /// -1 when nothing is selected
    #[serde(default = "no_index")]
    pub current_index: i64,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat: bool,
}

fn no_index() -> i64 {
    -1
}

impl Default for PersistedQueue {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            current_index: -1,
            shuffle: false,
            repeat: false,
        }
    }
}

pub struct QueueEngine {
    state: QueueState,
    next_id: u64,
    default_duration_ms: u64,
    rng: SmallRng,
}

impl QueueEngine {
    pub fn new(default_duration_ms: u64) -> Self {
        Self::with_rng(default_duration_ms, rand::make_rng())
    }

    pub fn with_rng(default_duration_ms: u64, rng: SmallRng) -> Self {
        Self {
            state: QueueState::default(),
            next_id: 1,
            default_duration_ms,
            rng,
        }
    }

    /// Restore verbatim; an index that points nowhere becomes "no selection"
    pub fn from_persisted(persisted: PersistedQueue, default_duration_ms: u64) -> Self {
        let mut engine = Self::new(default_duration_ms);
        let len = persisted.items.len() as i64;
        let current = (0..len)
            .contains(&persisted.current_index)
            .then_some(persisted.current_index as usize);

        engine.next_id = persisted.items.iter().map(|i| i.id).max().unwrap_or(0) + 1;
        engine.state = QueueState {
            items: persisted.items,
            current,
            shuffle: persisted.shuffle,
            repeat: persisted.repeat,
            ..QueueState::default()
        };
        engine
    }

    pub fn persisted(&self) -> PersistedQueue {
        PersistedQueue {
            items: self.state.items.clone(),
            current_index: self.state.current.map_or(-1, |i| i as i64),
            shuffle: self.state.shuffle,
            repeat: self.state.repeat,
        }
    }

    pub fn state(&self) -> &QueueState {
        &self.state
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.state.items
    }

    pub fn len(&self) -> usize {
        self.state.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.items.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.state.current
    }

    pub fn current_item(&self) -> Option<&QueueItem> {
        self.state.current.and_then(|i| self.state.items.get(i))
    }

    pub fn transport(&self) -> PlayerState {
        self.state.transport
    }

    pub fn default_duration_ms(&self) -> u64 {
        self.default_duration_ms
    }

    fn transition<R>(&mut self, f: impl FnOnce(&mut QueueState, &mut SmallRng) -> R) -> R {
        let mut next = self.state.clone();
        let result = f(&mut next, &mut self.rng);
        self.state = next;
        result
    }

    // --- Editing ---

    /// Append a request; returns the new item's id
    pub fn add(&mut self, request: &PlayRequest, source_id: Option<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let item = QueueItem {
            id,
            origin: request.origin,
            path: request.path.clone(),
            name: request.file_name().to_string(),
            category: request.category(),
            duration_ms: None,
            duration_override_ms: request.duration_override_ms,
            song: request.song,
            source_id,
        };
        self.transition(|s, _| s.items.push(item));
        id
    }

    pub fn remove(&mut self, index: usize) -> Result<Removal, PlayError> {
        if index >= self.state.items.len() {
            return Err(PlayError::NoSuchItem(index));
        }

        Ok(self.transition(|s, _| {
            let item = s.items.remove(index);
            let was_current = s.current == Some(index);
            match s.current {
                Some(c) if c == index => {
                    s.current = None;
                    s.stop();
                }
                Some(c) if c > index => s.current = Some(c - 1),
                _ => {}
            }
            Removal { item, was_current }
        }))
    }

    pub fn clear(&mut self) {
        self.transition(|s, _| {
            s.items.clear();
            s.current = None;
            s.stop();
        });
    }

    /// Only `duration_ms` is ever updated in place
    pub fn set_duration(&mut self, index: usize, duration_ms: Option<u64>) -> Result<(), PlayError> {
        if index >= self.state.items.len() {
            return Err(PlayError::NoSuchItem(index));
        }
        self.transition(|s, _| s.items[index].duration_ms = duration_ms);
        Ok(())
    }

    // --- Navigation ---

    /// Jump to an item (also allowed for filtered ones)
    pub fn select(&mut self, index: usize) -> Result<(), PlayError> {
        if index >= self.state.items.len() {
            return Err(PlayError::NoSuchItem(index));
        }
        self.transition(|s, _| s.start(index));
        Ok(())
    }

    pub fn next(&mut self) -> Advance {
        self.transition(|s, _| {
            let visible = s.visible_indices();
            let Some(&first) = visible.first() else {
                s.stop();
                return Advance::Stopped;
            };

            let target = match s.current {
                None => Some(first),
                Some(current) => visible
                    .iter()
                    .copied()
                    .find(|&i| i > current)
                    .or(s.repeat.then_some(first)),
            };

            match target {
                Some(index) => {
                    s.start(index);
                    Advance::Play(index)
                }
                None => {
                    s.stop();
                    Advance::Stopped
                }
            }
        })
    }

    /// Step back; a no-op at the first visible item
    pub fn previous(&mut self) -> Advance {
        let Some(current) = self.state.current else {
            return Advance::Unchanged;
        };
        let target = self
            .state
            .visible_indices()
            .into_iter()
            .rev()
            .find(|&i| i < current);

        match target {
            Some(index) => {
                self.transition(|s, _| s.start(index));
                Advance::Play(index)
            }
            None => Advance::Unchanged,
        }
    }

    // --- Modes ---

    /// Random permutation with the current item kept at its index
    pub fn reshuffle(&mut self) {
        self.transition(|s, rng| {
            let pinned = s.current;
            let mut items = std::mem::take(&mut s.items);
            let pinned_item = pinned.map(|i| items.remove(i));
            items.shuffle(rng);

            if let (Some(index), Some(item)) = (pinned, pinned_item) {
                items.insert(index, item);
            }
            s.items = items;
        });
    }

    pub fn set_shuffle(&mut self, enabled: bool) {
        self.transition(|s, _| s.shuffle = enabled);
        if enabled {
            self.reshuffle();
        }
    }

    pub fn set_repeat(&mut self, enabled: bool) {
        self.transition(|s, _| s.repeat = enabled);
    }

    /// Show or hide a category; returns true when it is now hidden
    pub fn toggle_filter(&mut self, category: PlayCategory) -> bool {
        self.transition(|s, _| {
            if s.hidden.remove(&category) {
                false
            } else {
                s.hidden.insert(category);
                true
            }
        })
    }

    // --- Transport ---

    pub fn set_transport(&mut self, transport: PlayerState) {
        self.transition(|s, _| {
            if transport == PlayerState::Stopped {
                s.stop();
            } else {
                s.transport = transport;
            }
        });
    }

    /// Advance the clock while playing. Returns true once the current item
    /// has run its full duration.
    pub fn tick(&mut self, delta_ms: u64) -> bool {
        if self.state.transport != PlayerState::Playing {
            return false;
        }
        let Some(duration) = self.current_item().map(|item| self.duration_of(item)) else {
            return false;
        };

        self.transition(|s, _| {
            s.elapsed_ms = (s.elapsed_ms + delta_ms).min(duration);
            s.elapsed_ms >= duration
        })
    }

    // --- Time ---

    /// metadata → override → configured default
    pub fn duration_of(&self, item: &QueueItem) -> u64 {
        item.duration_ms
            .or(item.duration_override_ms)
            .unwrap_or(self.default_duration_ms)
    }

    pub fn totals(&self) -> QueueTotals {
        let s = &self.state;
        let mut total_ms = 0;
        let mut played_ms = 0;

        for index in s.visible_indices() {
            let duration = self.duration_of(&s.items[index]);
            total_ms += duration;
            match s.current {
                Some(current) if index < current => played_ms += duration,
                Some(current) if index == current => played_ms += s.elapsed_ms.min(duration),
                _ => {}
            }
        }

        QueueTotals {
            total_ms,
            played_ms,
            remaining_ms: total_ms.saturating_sub(played_ms),
        }
    }
}
