use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::UpstreamVideo;

const USER_AGENT_STRING: &str = "subfeed/1.0";

/// Lists a channel's videos, newest first.
#[async_trait]
pub trait ChannelSource: Send + Sync {
    async fn fetch_channel_videos(&self, channel_id: &str) -> Result<Vec<UpstreamVideo>>;
}

/// Downloads a video thumbnail. `Ok(None)` means upstream has no image.
#[async_trait]
pub trait ThumbnailSource: Send + Sync {
    async fn fetch_thumbnail(&self, video_id: &str) -> Result<Option<Vec<u8>>>;
}

fn build_client() -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(USER_AGENT_STRING)
        .build()?;
    Ok(client)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChannelVideosResponse {
    Paged { videos: Vec<ChannelVideo> },
    Flat(Vec<ChannelVideo>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelVideo {
    video_id: String,
    title: String,
    #[serde(default)]
    length_seconds: i64,
    published_text: Option<String>,
    description: Option<String>,
}

impl From<ChannelVideo> for UpstreamVideo {
    fn from(video: ChannelVideo) -> Self {
        UpstreamVideo {
            video_id: video.video_id,
            title: video.title,
            duration: format_duration(video.length_seconds),
            published: video.published_text.filter(|s| !s.trim().is_empty()),
            description: video.description.filter(|s| !s.is_empty()),
        }
    }
}

fn format_duration(total_seconds: i64) -> String {
    let total_seconds = total_seconds.max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

fn parse_channel_videos(body: &str) -> Result<Vec<UpstreamVideo>> {
    let response: ChannelVideosResponse = serde_json::from_str(body)?;
    let videos = match response {
        ChannelVideosResponse::Paged { videos } => videos,
        ChannelVideosResponse::Flat(videos) => videos,
    };
    Ok(videos.into_iter().map(UpstreamVideo::from).collect())
}

/// Channel listings from an Invidious-compatible API.
pub struct InvidiousClient {
    client: Client,
    base_url: String,
}

impl InvidiousClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn channel_videos_url(&self, channel_id: &str) -> String {
        format!(
            "{}/api/v1/channels/{}/videos",
            self.base_url,
            urlencoding::encode(channel_id)
        )
    }
}

#[async_trait]
impl ChannelSource for InvidiousClient {
    async fn fetch_channel_videos(&self, channel_id: &str) -> Result<Vec<UpstreamVideo>> {
        let url = self.channel_videos_url(channel_id);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamFetch {
                channel_id: channel_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let body = response.text().await?;
        parse_channel_videos(&body)
    }
}

/// Thumbnails fetched from a URL template containing `{video_id}`.
pub struct HttpThumbnailSource {
    client: Client,
    url_template: String,
}

impl HttpThumbnailSource {
    pub fn new(url_template: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            url_template: url_template.to_string(),
        })
    }

    fn thumbnail_url(&self, video_id: &str) -> String {
        self.url_template
            .replace("{video_id}", &urlencoding::encode(video_id))
    }
}

#[async_trait]
impl ThumbnailSource for HttpThumbnailSource {
    async fn fetch_thumbnail(&self, video_id: &str) -> Result<Option<Vec<u8>>> {
        let response = self.client.get(self.thumbnail_url(video_id)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::ThumbnailFetch {
                video_id: video_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        Ok(Some(response.bytes().await?.to_vec()))
    }
}
