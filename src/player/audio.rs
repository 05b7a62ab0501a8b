//! Pause/resume muting through the device's mixer configuration 🔇
//!
//! The device keeps playing while "paused" at the machine level, so the mixer
//! volumes of every enabled channel are saved and forced to off, then written
//! back on resume. Failures here are reported but never stop playback.

use super::traits::DeviceCommands;
use crate::error::AudioSyncError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One mixer volume item plus the config item that says whether its
/// source is present at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerChannel {
    /// Item name inside the mixer category, e.g. "Vol UltiSid 1"
    pub name: String,
    pub gate_category: String,
    pub gate_item: String,
    /// Gate value meaning "not present"
    pub disabled_value: String,
}

impl MixerChannel {
    fn new(name: &str, gate_category: &str, gate_item: &str, disabled_value: &str) -> Self {
        Self {
            name: name.to_string(),
            gate_category: gate_category.to_string(),
            gate_item: gate_item.to_string(),
            disabled_value: disabled_value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    #[serde(default = "default_mixer_category")]
    pub mixer_category: String,
    #[serde(default = "default_off_value")]
    pub off_value: String,
    #[serde(default = "default_channels")]
    pub channels: Vec<MixerChannel>,
}

fn default_mixer_category() -> String {
    "Audio Mixer".to_string()
}

fn default_off_value() -> String {
    "OFF".to_string()
}

fn default_channels() -> Vec<MixerChannel> {
    vec![
        MixerChannel::new("Vol Socket 1", "SID Sockets Configuration", "SID Socket 1", "Disabled"),
        MixerChannel::new("Vol Socket 2", "SID Sockets Configuration", "SID Socket 2", "Disabled"),
        MixerChannel::new("Vol UltiSid 1", "SID Addressing", "UltiSID 1 Address", "Unmapped"),
        MixerChannel::new("Vol UltiSid 2", "SID Addressing", "UltiSID 2 Address", "Unmapped"),
    ]
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            mixer_category: default_mixer_category(),
            off_value: default_off_value(),
            channels: default_channels(),
        }
    }
}

/// A channel's volume from before it was forced off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioChannelSnapshot {
    pub channel: String,
    pub prior_value: String,
}

/// Edit held back while muted, applied once the snapshot is restored
#[derive(Debug, Clone, PartialEq, Eq)]
enum StagedEdit {
    Volume { channel: String, value: String },
    Solo(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Solo {
    channel: String,
    others: Vec<AudioChannelSnapshot>,
}

#[derive(Debug, Clone, Default)]
pub struct AudioSession {
    settings: AudioSettings,
    /// Captured once per pause cycle; untouched until a successful restore
    snapshot: Option<Vec<AudioChannelSnapshot>>,
    staged: Vec<StagedEdit>,
    solo: Option<Solo>,
}

impl AudioSession {
    pub fn new(settings: AudioSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn is_muted(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn snapshot(&self) -> Option<&[AudioChannelSnapshot]> {
        self.snapshot.as_deref()
    }

    pub fn soloed(&self) -> Option<&str> {
        self.solo.as_ref().map(|s| s.channel.as_str())
    }

    pub fn staged_edits(&self) -> usize {
        self.staged.len()
    }

    /// Hand the snapshot to the state file (one-shot `pause`)
    pub fn export(&self) -> Option<Vec<AudioChannelSnapshot>> {
        self.snapshot.clone()
    }

    /// Adopt a snapshot saved by an earlier process (one-shot `resume`)
    pub fn import(&mut self, snapshot: Vec<AudioChannelSnapshot>) {
        self.snapshot = Some(snapshot);
    }

    /// Forget the snapshot and staged edits without touching the device
    pub fn abandon(&mut self) {
        if self.snapshot.take().is_some() {
            info!("Audio snapshot abandoned");
        }
        self.staged.clear();
    }

    fn channel(&self, name: &str) -> Result<&MixerChannel, AudioSyncError> {
        self.settings
            .channels
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| AudioSyncError::UnknownChannel(name.to_string()))
    }

    /// Channels whose gate item is not at its disabled value
    pub async fn enabled_channels<D: DeviceCommands>(
        &self,
        device: &D,
    ) -> Result<Vec<MixerChannel>, AudioSyncError> {
        let mut enabled = Vec::new();
        for channel in &self.settings.channels {
            let gate = device
                .get_config(&channel.gate_category, &channel.gate_item)
                .await
                .map_err(|source| AudioSyncError::Read {
                    item: channel.gate_item.clone(),
                    source,
                })?;
            if gate.trim() != channel.disabled_value {
                enabled.push(channel.clone());
            }
        }
        Ok(enabled)
    }

    async fn read_volumes<D: DeviceCommands>(
        &self,
        device: &D,
        channels: &[MixerChannel],
    ) -> Result<Vec<AudioChannelSnapshot>, AudioSyncError> {
        let mut values = Vec::with_capacity(channels.len());
        for channel in channels {
            let prior_value = device
                .get_config(&self.settings.mixer_category, &channel.name)
                .await
                .map_err(|source| AudioSyncError::Read {
                    item: channel.name.clone(),
                    source,
                })?;
            values.push(AudioChannelSnapshot {
                channel: channel.name.clone(),
                prior_value,
            });
        }
        Ok(values)
    }

    async fn write_batch<D: DeviceCommands>(
        &self,
        device: &D,
        items: Vec<(String, String)>,
    ) -> Result<(), AudioSyncError> {
        if items.is_empty() {
            return Ok(());
        }
        let count = items.len();
        device
            .batch_set_config(&self.settings.mixer_category, &items)
            .await
            .map_err(|source| AudioSyncError::Write { count, source })
    }

    fn off_items(&self, snapshot: &[AudioChannelSnapshot]) -> Vec<(String, String)> {
        snapshot
            .iter()
            .map(|s| (s.channel.clone(), self.settings.off_value.clone()))
            .collect()
    }

    fn restore_items(snapshot: &[AudioChannelSnapshot]) -> Vec<(String, String)> {
        snapshot
            .iter()
            .map(|s| (s.channel.clone(), s.prior_value.clone()))
            .collect()
    }

    /// Save every enabled channel's volume and force them all off in one write.
    /// A second call while muted does nothing.
    pub async fn mute<D: DeviceCommands>(&mut self, device: &D) -> Result<(), AudioSyncError> {
        if self.snapshot.is_some() {
            debug!("Already muted, keeping the existing snapshot");
            return Ok(());
        }

        // 1. Capture
        let channels = self.enabled_channels(device).await?;
        let snapshot = self.read_volumes(device, &channels).await?;
        let off = self.off_items(&snapshot);
        self.snapshot = Some(snapshot);

        // 2. Silence
        self.write_batch(device, off).await?;
        info!(channels = channels.len(), "Audio muted");
        Ok(())
    }

    /// Write every saved volume back in one batch, then apply staged edits.
    /// If the batch fails the snapshot stays so the next attempt can retry.
    pub async fn restore<D: DeviceCommands>(&mut self, device: &D) -> Result<(), AudioSyncError> {
        let Some(snapshot) = self.snapshot.as_deref() else {
            return self.apply_staged(device).await;
        };

        let items = Self::restore_items(snapshot);
        let count = items.len();
        self.write_batch(device, items).await?;
        self.snapshot = None;
        info!(channels = count, "Audio restored");

        self.apply_staged(device).await
    }

    async fn apply_staged<D: DeviceCommands>(&mut self, device: &D) -> Result<(), AudioSyncError> {
        let staged = std::mem::take(&mut self.staged);
        for edit in staged {
            debug!(?edit, "Applying staged mixer edit");
            match edit {
                StagedEdit::Volume { channel, value } => self.write_volume(device, &channel, &value).await?,
                StagedEdit::Solo(channel) => self.apply_solo(device, channel.as_deref()).await?,
            }
        }
        Ok(())
    }

    async fn write_volume<D: DeviceCommands>(
        &self,
        device: &D,
        channel: &str,
        value: &str,
    ) -> Result<(), AudioSyncError> {
        device
            .set_config(&self.settings.mixer_category, channel, value)
            .await
            .map_err(|source| AudioSyncError::Write { count: 1, source })
    }

    /// Live volume edit; staged while muted
    pub async fn set_volume<D: DeviceCommands>(
        &mut self,
        device: &D,
        channel: &str,
        value: &str,
    ) -> Result<(), AudioSyncError> {
        let channel = self.channel(channel)?.name.clone();

        if self.is_muted() {
            debug!(%channel, value, "Muted, staging volume edit");
            self.staged.push(StagedEdit::Volume {
                channel,
                value: value.to_string(),
            });
            return Ok(());
        }
        self.write_volume(device, &channel, value).await
    }

    /// Solo one channel (mute the other enabled ones), or `None` to unsolo.
    /// Staged while muted.
    pub async fn set_solo<D: DeviceCommands>(
        &mut self,
        device: &D,
        channel: Option<&str>,
    ) -> Result<(), AudioSyncError> {
        let channel = match channel {
            Some(name) => Some(self.channel(name)?.name.clone()),
            None => None,
        };

        if self.is_muted() {
            debug!(?channel, "Muted, staging solo edit");
            self.staged.push(StagedEdit::Solo(channel));
            return Ok(());
        }
        self.apply_solo(device, channel.as_deref()).await
    }

    async fn apply_solo<D: DeviceCommands>(
        &mut self,
        device: &D,
        channel: Option<&str>,
    ) -> Result<(), AudioSyncError> {
        // Undo any previous solo first
        if let Some(previous) = self.solo.take() {
            if let Err(e) = self.write_batch(device, Self::restore_items(&previous.others)).await {
                self.solo = Some(previous);
                return Err(e);
            }
        }

        let Some(channel) = channel else {
            return Ok(());
        };

        let others: Vec<MixerChannel> = self
            .enabled_channels(device)
            .await?
            .into_iter()
            .filter(|c| c.name != channel)
            .collect();
        let others = self.read_volumes(device, &others).await?;
        let off = self.off_items(&others);

        self.solo = Some(Solo {
            channel: channel.to_string(),
            others,
        });
        self.write_batch(device, off).await
    }
}

/// Log an audio failure; playback carries on regardless
pub fn report(result: Result<(), AudioSyncError>, action: &str) {
    if let Err(e) = result {
        warn!(action, error = %e, "Audio sync failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::fake::{timeout, Call, RecordingDevice};

    const MIXER: &str = "Audio Mixer";

    /// Socket 1 fitted, socket 2 empty, both UltiSIDs mapped
    fn device() -> RecordingDevice {
        RecordingDevice::with_config(&[
            ("SID Sockets Configuration", "SID Socket 1", "Enabled"),
            ("SID Sockets Configuration", "SID Socket 2", "Disabled"),
            ("SID Addressing", "UltiSID 1 Address", "$D400"),
            ("SID Addressing", "UltiSID 2 Address", "$D420"),
            (MIXER, "Vol Socket 1", "+2 dB"),
            (MIXER, "Vol Socket 2", "0 dB"),
            (MIXER, "Vol UltiSid 1", "-3 dB"),
            (MIXER, "Vol UltiSid 2", "0 dB"),
        ])
    }

    fn batches(device: &RecordingDevice) -> Vec<Vec<(String, String)>> {
        device
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::BatchSetConfig(_, items) => Some(items),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_pause_resume_restores_exact_values() {
        let device = device();
        let mut audio = AudioSession::new(AudioSettings::default());

        audio.mute(&device).await.unwrap();
        assert!(audio.is_muted());
        assert_eq!(device.value(MIXER, "Vol Socket 1").as_deref(), Some("OFF"));
        assert_eq!(device.value(MIXER, "Vol UltiSid 1").as_deref(), Some("OFF"));
        assert_eq!(device.value(MIXER, "Vol UltiSid 2").as_deref(), Some("OFF"));
        // Disabled socket is never touched
        assert_eq!(device.value(MIXER, "Vol Socket 2").as_deref(), Some("0 dB"));

        audio.restore(&device).await.unwrap();
        assert!(!audio.is_muted());
        assert_eq!(device.value(MIXER, "Vol Socket 1").as_deref(), Some("+2 dB"));
        assert_eq!(device.value(MIXER, "Vol UltiSid 1").as_deref(), Some("-3 dB"));
        assert_eq!(device.value(MIXER, "Vol UltiSid 2").as_deref(), Some("0 dB"));

        // One batch each way
        assert_eq!(batches(&device).len(), 2);
    }

    #[tokio::test]
    async fn test_second_pause_keeps_first_snapshot() {
        let device = device();
        let mut audio = AudioSession::new(AudioSettings::default());

        audio.mute(&device).await.unwrap();
        let first = audio.export();
        audio.mute(&device).await.unwrap();
        assert_eq!(audio.export(), first);
        assert_eq!(batches(&device).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_restore_keeps_snapshot() {
        let device = device();
        let mut audio = AudioSession::new(AudioSettings::default());
        audio.mute(&device).await.unwrap();

        device.fail("batch_set_config", timeout("configs"));
        let err = audio.restore(&device).await.unwrap_err();
        assert!(matches!(err, AudioSyncError::Write { count: 3, .. }));
        assert!(audio.is_muted());

        // A pause in between must not capture the OFF values
        audio.mute(&device).await.unwrap();

        device.heal("batch_set_config");
        audio.restore(&device).await.unwrap();
        assert_eq!(device.value(MIXER, "Vol Socket 1").as_deref(), Some("+2 dB"));
    }

    #[tokio::test]
    async fn test_read_failure_leaves_no_snapshot() {
        let device = device();
        device.fail("get_config", timeout("configs"));
        let mut audio = AudioSession::new(AudioSettings::default());

        let err = audio.mute(&device).await.unwrap_err();
        assert!(matches!(err, AudioSyncError::Read { .. }));
        assert!(!audio.is_muted());
    }

    #[tokio::test]
    async fn test_volume_edit_while_paused_is_staged() {
        let device = device();
        let mut audio = AudioSession::new(AudioSettings::default());
        audio.mute(&device).await.unwrap();

        audio.set_volume(&device, "vol ultisid 1", "+6 dB").await.unwrap();
        assert_eq!(audio.staged_edits(), 1);
        assert_eq!(device.value(MIXER, "Vol UltiSid 1").as_deref(), Some("OFF"));

        audio.restore(&device).await.unwrap();
        assert_eq!(audio.staged_edits(), 0);
        assert_eq!(device.value(MIXER, "Vol UltiSid 1").as_deref(), Some("+6 dB"));
    }

    #[tokio::test]
    async fn test_live_volume_edit() {
        let device = device();
        let mut audio = AudioSession::new(AudioSettings::default());
        audio.set_volume(&device, "Vol Socket 1", "-6 dB").await.unwrap();
        assert_eq!(device.value(MIXER, "Vol Socket 1").as_deref(), Some("-6 dB"));

        let err = audio.set_volume(&device, "Vol Tape", "0 dB").await.unwrap_err();
        assert_eq!(err, AudioSyncError::UnknownChannel("Vol Tape".to_string()));
    }

    #[tokio::test]
    async fn test_solo_and_unsolo() {
        let device = device();
        let mut audio = AudioSession::new(AudioSettings::default());

        audio.set_solo(&device, Some("Vol UltiSid 1")).await.unwrap();
        assert_eq!(audio.soloed(), Some("Vol UltiSid 1"));
        assert_eq!(device.value(MIXER, "Vol UltiSid 1").as_deref(), Some("-3 dB"));
        assert_eq!(device.value(MIXER, "Vol Socket 1").as_deref(), Some("OFF"));
        assert_eq!(device.value(MIXER, "Vol UltiSid 2").as_deref(), Some("OFF"));

        audio.set_solo(&device, None).await.unwrap();
        assert_eq!(audio.soloed(), None);
        assert_eq!(device.value(MIXER, "Vol Socket 1").as_deref(), Some("+2 dB"));
        assert_eq!(device.value(MIXER, "Vol UltiSid 2").as_deref(), Some("0 dB"));
    }

    #[tokio::test]
    async fn test_export_import_across_sessions() {
        let device = device();
        let mut first = AudioSession::new(AudioSettings::default());
        first.mute(&device).await.unwrap();
        let saved = first.export().unwrap();

        let mut second = AudioSession::new(AudioSettings::default());
        second.import(saved);
        second.restore(&device).await.unwrap();
        assert_eq!(device.value(MIXER, "Vol UltiSid 1").as_deref(), Some("-3 dB"));
    }

    #[tokio::test]
    async fn test_abandon_skips_restore() {
        let device = device();
        let mut audio = AudioSession::new(AudioSettings::default());
        audio.mute(&device).await.unwrap();
        audio.abandon();
        device.clear_calls();

        audio.restore(&device).await.unwrap();
        assert!(device.calls().is_empty());
    }
}
