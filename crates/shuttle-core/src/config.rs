use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;
use crate::error::{Result, ShuttleError};

/// Runtime settings, read from `<config_dir>/config.toml` when it exists.
/// The file is never written; a missing file means defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub mpv: MpvConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Start playing as soon as the app launches.
    #[serde(default = "default_autoplay")]
    pub autoplay: bool,
    /// Station name to start with; the first catalog entry when unset or unknown.
    #[serde(default)]
    pub initial_station: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpvConfig {
    /// Explicit mpv binary; searched beside the executable and on PATH otherwise.
    #[serde(default)]
    pub binary: Option<PathBuf>,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            autoplay: default_autoplay(),
            initial_station: None,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
        }
    }
}

impl PollingConfig {
    /// Zero would spin the poll loop; clamp to one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for MpvConfig {
    fn default() -> Self {
        Self {
            binary: None,
            volume: default_volume(),
        }
    }
}

fn default_autoplay() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("shuttle/{}", env!("CARGO_PKG_VERSION"))
}

fn default_volume() -> f32 {
    1.0
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ShuttleError::Config(e.to_string()))
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.playback.autoplay);
        assert!(config.playback.initial_station.is_none());
        assert_eq!(config.polling.interval(), Duration::from_secs(15));
        assert_eq!(config.http.timeout_secs, 10);
        assert!(config.http.user_agent.starts_with("shuttle/"));
        assert!(config.mpv.binary.is_none());
        assert!(Config::config_path().ends_with("shuttle/config.toml"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [playback]
            initial_station = "Dragon’s Tower"

            [polling]
            interval_secs = 30
            "#,
        )
        .unwrap();
        assert!(config.playback.autoplay);
        assert_eq!(config.playback.initial_station.as_deref(), Some("Dragon’s Tower"));
        assert_eq!(config.polling.interval(), Duration::from_secs(30));
        assert_eq!(config.http.connect_timeout_secs, 5);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let config = Config::from_toml_str("[polling]\ninterval_secs = 0\n").unwrap();
        assert_eq!(config.polling.interval(), Duration::from_secs(1));
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        assert!(matches!(
            Config::from_toml_str("[polling]\ninterval_secs = \"soon\""),
            Err(ShuttleError::Config(_))
        ));
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert!(config.playback.autoplay);
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[playback]\nautoplay = false\n[mpv]\nvolume = 0.4\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert!(!config.playback.autoplay);
        assert!((config.mpv.volume - 0.4).abs() < f32::EPSILON);
    }
}
