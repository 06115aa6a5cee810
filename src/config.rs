use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

const APP_DIR: &str = "subfeed";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_thumbnails_dir")]
    pub thumbnails_dir: String,

    /// Base URL of the Invidious-compatible instance used to list channel videos.
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Thumbnail URL with a `{video_id}` placeholder.
    #[serde(default = "default_thumbnail_url")]
    pub thumbnail_url: String,

    /// Workers per queue.
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_channel_check_interval")]
    pub channel_check_interval_ms: u64,

    #[serde(default = "default_thumbnail_interval")]
    pub thumbnail_interval_ms: u64,

    /// Daemon sweep period; 0 disables periodic checks.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_minutes: u32,
}

fn data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    data_dir()
        .join("subscriptions.sqlite")
        .to_string_lossy()
        .to_string()
}

fn default_thumbnails_dir() -> String {
    data_dir()
        .join("subscription_thumbnails")
        .to_string_lossy()
        .to_string()
}

fn default_upstream_url() -> String {
    "https://inv.nadeko.net".to_string()
}

fn default_thumbnail_url() -> String {
    "https://i.ytimg.com/vi/{video_id}/mqdefault.jpg".to_string()
}

fn default_workers() -> usize {
    5
}

fn default_channel_check_interval() -> u64 {
    1000
}

fn default_thumbnail_interval() -> u64 {
    250
}

fn default_refresh_interval() -> u32 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            thumbnails_dir: default_thumbnails_dir(),
            upstream_url: default_upstream_url(),
            thumbnail_url: default_thumbnail_url(),
            workers: default_workers(),
            channel_check_interval_ms: default_channel_check_interval(),
            thumbnail_interval_ms: default_thumbnail_interval(),
            refresh_interval_minutes: default_refresh_interval(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(AppError::Config("workers must be at least 1".to_string()));
        }
        if !self.thumbnail_url.contains("{video_id}") {
            return Err(AppError::Config(
                "thumbnail_url must contain a {video_id} placeholder".to_string(),
            ));
        }
        url::Url::parse(&self.upstream_url)
            .map_err(|e| AppError::Config(format!("invalid upstream_url: {}", e)))?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    pub fn channel_check_interval(&self) -> Duration {
        Duration::from_millis(self.channel_check_interval_ms)
    }

    pub fn thumbnail_interval(&self) -> Duration {
        Duration::from_millis(self.thumbnail_interval_ms)
    }
}
