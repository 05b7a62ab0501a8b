use crate::player::{AudioSettings, AutostartMode, Drive, ExecutorSettings, PlaybackSettings};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// User-editable configuration (read-only after load)
/// stored in `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Sent as `X-Password` when not empty
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://c64u".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            password: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DeviceConfig {
    pub fn password(&self) -> Option<String> {
        (!self.password.is_empty()).then(|| self.password.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub autostart: AutostartMode,
    #[serde(default)]
    pub drive: Drive,
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: u64,
    /// Boot wait after reboot/reset
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    /// HVSC `Songlengths.md5`, or the HVSC root holding it
    #[serde(default)]
    pub songlengths: String,
}

fn default_duration_secs() -> u64 {
    180
}

fn default_settle_ms() -> u64 {
    3000
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_poll_attempts() -> u32 {
    200
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            autostart: AutostartMode::default(),
            drive: Drive::default(),
            default_duration_secs: default_duration_secs(),
            settle_ms: default_settle_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_attempts: default_poll_attempts(),
            songlengths: String::new(),
        }
    }
}

impl PlaybackConfig {
    pub fn playback_settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            autostart: self.autostart,
            drive: self.drive,
            default_duration_ms: self.default_duration_secs * 1000,
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            settle_delay: Duration::from_millis(self.settle_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            poll_attempts: self.poll_attempts,
        }
    }

    pub fn songlengths_path(&self) -> Option<PathBuf> {
        (!self.songlengths.is_empty()).then(|| PathBuf::from(&self.songlengths))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `error`, `warn`, `info`, `debug` or `trace`
    #[serde(default = "default_level")]
    pub level: String,
    /// Log directory; empty means the cache dir
    #[serde(default)]
    pub directory: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directory: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: UserConfig = toml::from_str(
            r#"
            [device]
            base_url = "http://192.168.1.64"

            [playback]
            autostart = "dma"
            drive = "b"
            "#,
        )
        .unwrap();

        assert_eq!(config.device.base_url, "http://192.168.1.64");
        assert_eq!(config.device.timeout_secs, 10);
        assert_eq!(config.device.password(), None);
        assert_eq!(config.playback.autostart, AutostartMode::Dma);
        assert_eq!(config.playback.drive, Drive::B);
        assert_eq!(config.playback.playback_settings().default_duration_ms, 180_000);
        assert_eq!(config.audio, AudioSettings::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_default_config_round_trips() {
        let text = toml::to_string_pretty(&UserConfig::default()).unwrap();
        let parsed: UserConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, UserConfig::default());
    }
}
