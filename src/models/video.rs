use serde::{Deserialize, Serialize};

/// One entry of a channel listing as the upstream provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamVideo {
    pub video_id: String,
    pub title: String,
    pub duration: String,
    /// Relative publish time such as "3 hours ago".
    pub published: Option<String>,
    pub description: Option<String>,
}

/// A video resolved to an absolute timestamp, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVideo {
    pub video_id: String,
    pub title: String,
    pub duration: String,
    pub published_at: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEntry {
    pub video_id: String,
    pub title: String,
    pub duration: Option<String>,
    pub published_at: i64,
    pub channel_id: String,
    pub channel_name: String,
}
