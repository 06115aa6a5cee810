use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to fetch videos for channel {channel_id}: {reason}")]
    UpstreamFetch { channel_id: String, reason: String },

    #[error("Malformed upstream entry: {0}")]
    MalformedEntry(String),

    #[error("Unparseable import: {0}")]
    ImportParse(String),

    #[error("Failed to fetch thumbnail for {video_id}: {reason}")]
    ThumbnailFetch { video_id: String, reason: String },

    #[error("Channel not subscribed: {0}")]
    ChannelNotFound(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<opml::Error> for AppError {
    fn from(e: opml::Error) -> Self {
        AppError::ImportParse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
