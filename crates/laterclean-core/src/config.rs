use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::CleanerError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
///
/// This is deployment configuration (API endpoint, timings, OAuth client).
/// The user's removal policy lives in [`crate::models::Settings`] and is
/// persisted through the store instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub sampler: SamplerConfig,
    pub clean: CleanConfig,
    pub youtube: YouTubeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub interval_secs: u64,
    pub player_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanConfig {
    pub estimated_duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeConfig {
    pub api_base: String,
    pub playlist_id: String,
    pub page_size: u32,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn player_wait(&self) -> Duration {
        Duration::from_secs(self.player_wait_secs)
    }
}

impl AppConfig {
    /// Load config: the user file if it exists, otherwise built-in defaults.
    pub fn load() -> Result<Self, CleanerError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            let user_str = std::fs::read_to_string(&user_path)?;
            Self::from_toml(&user_str)
        } else {
            Self::from_toml(DEFAULT_CONFIG)
        }
    }

    pub fn from_toml(s: &str) -> Result<Self, CleanerError> {
        toml::from_str(s).map_err(|e| CleanerError::Config(e.to_string()))
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the database file.
    pub fn db_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("laterclean.db"))
            .unwrap_or_else(|| PathBuf::from("laterclean.db"))
    }

    /// Ensure the data directory exists and return the DB path.
    pub fn ensure_db_path() -> Result<PathBuf, CleanerError> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "laterclean")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = AppConfig::default();
        assert_eq!(config.sampler.interval_secs, 5);
        assert_eq!(config.sampler.player_wait(), Duration::from_secs(5));
        assert_eq!(config.clean.estimated_duration_secs, 600);
        assert_eq!(config.youtube.playlist_id, "WL");
        assert_eq!(config.youtube.page_size, 50);
        assert!(config.youtube.client_id.is_none());
    }

    #[test]
    fn test_roundtrip() {
        let mut config = AppConfig::default();
        config.youtube.client_id = Some("1234.apps.googleusercontent.com".into());
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized = AppConfig::from_toml(&serialized).unwrap();
        assert_eq!(
            deserialized.youtube.client_id.as_deref(),
            Some("1234.apps.googleusercontent.com")
        );
        assert_eq!(deserialized.sampler.interval_secs, config.sampler.interval_secs);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let mut config = AppConfig::default();
        config.sampler.interval_secs = 0;
        assert_eq!(config.sampler.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        assert!(matches!(
            AppConfig::from_toml("[sampler]\ninterval_secs = \"soon\""),
            Err(CleanerError::Config(_))
        ));
    }
}
