use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{NewVideo, UpstreamVideo};
use crate::queue::{Job, Pending};
use crate::services::{ChannelSource, Thumbnails};

use super::relative_time;

/// Videos older than this are not worth the bandwidth to thumbnail.
pub const FRESHNESS_WINDOW_SECS: i64 = 30 * 24 * 3600;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub fetched: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub thumbnails_requested: usize,
}

/// Resolves a newest-first listing to absolute timestamps. Entries without a
/// usable relative time are logged and left out; the others keep the
/// position they had in the listing.
pub fn resolve_listing(listing: Vec<UpstreamVideo>, now: i64) -> Vec<NewVideo> {
    listing
        .into_iter()
        .enumerate()
        .filter_map(|(position, video)| {
            let Some(published) = video.published.as_deref() else {
                tracing::warn!("Skipping video {} without a publish time", video.video_id);
                return None;
            };
            match relative_time::resolve(published, now, position) {
                Ok(published_at) => Some(NewVideo {
                    video_id: video.video_id,
                    title: video.title,
                    duration: video.duration,
                    published_at,
                    description: video.description,
                }),
                Err(e) => {
                    tracing::warn!("Skipping video {}: {}", video.video_id, e);
                    None
                }
            }
        })
        .collect()
}

/// Merges a channel's current upstream listing into the store.
pub struct Poller {
    repository: Repository,
    source: Arc<dyn ChannelSource>,
    thumbnails: Arc<Thumbnails>,
    channel_names: Arc<DashMap<String, String>>,
}

impl Poller {
    pub fn new(
        repository: Repository,
        source: Arc<dyn ChannelSource>,
        thumbnails: Arc<Thumbnails>,
        channel_names: Arc<DashMap<String, String>>,
    ) -> Self {
        Self {
            repository,
            source,
            thumbnails,
            channel_names,
        }
    }

    pub async fn check_channel(&self, channel_id: &str) -> Result<PollSummary> {
        match self.channel_names.get(channel_id) {
            Some(name) => tracing::info!("Checking channel: {}", name.value()),
            None => tracing::info!("Checking channel {}", channel_id),
        }

        if !self.repository.is_subscribed(channel_id).await? {
            return Err(AppError::ChannelNotFound(channel_id.to_string()));
        }

        let listing = self
            .source
            .fetch_channel_videos(channel_id)
            .await
            .map_err(|e| match e {
                AppError::UpstreamFetch { .. } => e,
                other => AppError::UpstreamFetch {
                    channel_id: channel_id.to_string(),
                    reason: other.to_string(),
                },
            })?;

        self.reconcile(channel_id, listing, Utc::now().timestamp()).await
    }

    /// Writes a fetched listing as of `now` and requests thumbnails for the
    /// fresh part of it. Rows are only written once the whole listing has
    /// been resolved.
    pub async fn reconcile(
        &self,
        channel_id: &str,
        listing: Vec<UpstreamVideo>,
        now: i64,
    ) -> Result<PollSummary> {
        let fetched = listing.len();
        let videos = resolve_listing(listing, now);
        let skipped = fetched - videos.len();

        let fresh: Vec<String> = videos
            .iter()
            .filter(|video| now - video.published_at < FRESHNESS_WINDOW_SECS)
            .map(|video| video.video_id.clone())
            .collect();

        let inserted = self.repository.record_poll(channel_id, videos, now).await?;
        let thumbnails_requested = self.thumbnails.request(&fresh);

        let summary = PollSummary {
            fetched,
            inserted,
            skipped,
            thumbnails_requested,
        };
        tracing::debug!(channel_id, ?summary, "channel reconciled");
        Ok(summary)
    }
}

#[async_trait]
impl Job<Pending> for Poller {
    async fn run(&self, item: Pending) -> Result<()> {
        self.check_channel(item.id()).await?;
        Ok(())
    }
}
