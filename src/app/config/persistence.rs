use crate::player::queue::PersistedQueue;
use crate::player::{AudioChannelSnapshot, PlayerState};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// What we remember about one device between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    #[serde(default)]
    pub queue: PersistedQueue,
    #[serde(default)]
    pub transport: PlayerState,
    /// Mixer values saved by a `pause` that has not been resumed yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_snapshot: Option<Vec<AudioChannelSnapshot>>,
}

/// Automatically saved session state
/// stored in `state.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentState {
    /// Keyed by device identity (unique id, host name or base URL)
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceState>,
}

impl PersistentState {
    pub fn device(&self, identity: &str) -> DeviceState {
        self.devices.get(identity).cloned().unwrap_or_default()
    }

    pub fn set_device(&mut self, identity: &str, state: DeviceState) {
        self.devices.insert(identity.to_string(), state);
    }

    pub fn load_from(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|content| toml::from_str(&content).ok())
            .unwrap_or_default()
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize state")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&super::AppConfig::get_state_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::plan::Origin;
    use crate::player::{PlayCategory, QueueItem};

    #[test]
    fn test_state_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");

        let mut state = PersistentState::default();
        state.set_device(
            "http://c64u",
            DeviceState {
                queue: PersistedQueue {
                    items: vec![QueueItem {
                        id: 1,
                        origin: Origin::Remote,
                        path: "/USB0/Commando.sid".to_string(),
                        name: "Commando.sid".to_string(),
                        category: PlayCategory::Sid,
                        duration_ms: Some(252_000),
                        duration_override_ms: None,
                        song: Some(1),
                        source_id: None,
                    }],
                    current_index: 0,
                    shuffle: false,
                    repeat: true,
                },
                transport: PlayerState::Paused,
                audio_snapshot: Some(vec![AudioChannelSnapshot {
                    channel: "Vol UltiSid 1".to_string(),
                    prior_value: "0 dB".to_string(),
                }]),
            },
        );

        state.save_to(&path).unwrap();
        let loaded = PersistentState::load_from(&path);
        assert_eq!(loaded, state);
        assert_eq!(loaded.device("http://c64u").queue.current_index, 0);
    }

    #[test]
    fn test_missing_or_broken_state_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(PersistentState::load_from(&dir.path().join("nope.toml")), PersistentState::default());

        let broken = dir.path().join("state.toml");
        fs::write(&broken, "devices = 3").unwrap();
        assert_eq!(PersistentState::load_from(&broken), PersistentState::default());
        assert_eq!(PersistentState::default().device("x"), DeviceState::default());
    }
}
