use std::fs;
use std::path::{Path, PathBuf};

pub mod persistence;
pub mod user;

pub use persistence::{DeviceState, PersistentState};
pub use user::{DeviceConfig, LoggingConfig, PlaybackConfig, UserConfig};

pub struct AppConfig;

impl AppConfig {
    pub fn get_config_dir() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let xdg_dir = home.join(".config").join("ultiplay");

        // Ensure it exists
        if !xdg_dir.exists() {
            let _ = fs::create_dir_all(&xdg_dir);
        }

        xdg_dir
    }

    /// Log files live with the other caches
    pub fn get_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ultiplay")
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_state_path() -> PathBuf {
        Self::get_config_dir().join("state.toml")
    }

    /// Load both from the default location
    pub fn load() -> (UserConfig, PersistentState) {
        Self::load_from(&Self::get_config_dir())
    }

    /// Load `config.toml` (written with defaults when missing) and `state.toml`
    pub fn load_from(dir: &Path) -> (UserConfig, PersistentState) {
        let config_path = dir.join("config.toml");
        let state_path = dir.join("state.toml");

        // 1. Load User Config
        let user_config = if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                    eprintln!("⚠️  Ignoring invalid {}: {}", config_path.display(), e);
                    UserConfig::default()
                }),
                Err(_) => UserConfig::default(),
            }
        } else {
            // Create default config.toml if missing
            let c = UserConfig::default();
            if let Ok(content) = toml::to_string_pretty(&c) {
                let _ = fs::write(&config_path, content);
            }
            c
        };

        // 2. Load State
        let state = PersistentState::load_from(&state_path);

        (user_config, state)
    }

    pub fn default_config_toml() -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(&UserConfig::default())?)
    }
}
