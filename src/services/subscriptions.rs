use std::path::Path;

use crate::db::Repository;
use crate::error::Result;
use crate::feed::{parse_subscription_file, parse_subscriptions, ImportFormat};
use crate::models::{Channel, TagGroup, TaggedChannel, VideoEntry};

/// Splits "Music, news ,, Music" into normalized tags: trimmed, lower-case,
/// de-duplicated, empty entries dropped.
pub fn parse_tag_list(input: &str) -> Vec<String> {
    normalize_tags(input.split(','))
}

fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().to_lowercase();
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}

fn to_owned_ids(channel_ids: &[impl AsRef<str>]) -> Vec<String> {
    channel_ids.iter().map(|id| id.as_ref().to_string()).collect()
}

/// Caller-initiated subscription edits and the read queries behind the
/// subscription pages. Errors propagate to the caller.
#[derive(Clone)]
pub struct SubscriptionManager {
    repository: Repository,
}

impl SubscriptionManager {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn subscribe(&self, channels: Vec<(String, String)>) -> Result<usize> {
        let inserted = self.repository.subscribe(channels).await?;
        tracing::info!("Subscribed to {} new channels", inserted);
        Ok(inserted)
    }

    pub async fn unsubscribe(&self, channel_ids: &[impl AsRef<str>]) -> Result<usize> {
        let deleted = self.repository.unsubscribe(to_owned_ids(channel_ids)).await?;
        tracing::info!("Unsubscribed from {} channels", deleted);
        Ok(deleted)
    }

    /// Subscribes to every channel in an exported list. Nothing is written if
    /// the content cannot be parsed.
    pub async fn import(&self, format: ImportFormat, content: &str) -> Result<usize> {
        let channels = parse_subscriptions(format, content)?;
        tracing::info!("Importing {} channels from {:?} list", channels.len(), format);
        self.subscribe(channels).await
    }

    pub async fn import_file(&self, path: &Path) -> Result<usize> {
        let channels = parse_subscription_file(path)?;
        tracing::info!("Importing {} channels from {:?}", channels.len(), path);
        self.subscribe(channels).await
    }

    pub async fn add_tags(&self, channel_ids: &[impl AsRef<str>], tags: &[impl AsRef<str>]) -> Result<usize> {
        let tags = normalize_tags(tags);
        self.repository.add_tags(to_owned_ids(channel_ids), tags).await
    }

    pub async fn remove_tags(&self, channel_ids: &[impl AsRef<str>], tags: &[impl AsRef<str>]) -> Result<usize> {
        let tags = normalize_tags(tags);
        self.repository.remove_tags(to_owned_ids(channel_ids), tags).await
    }

    pub async fn set_muted(&self, channel_ids: &[impl AsRef<str>], muted: bool) -> Result<usize> {
        self.repository.set_muted(to_owned_ids(channel_ids), muted).await
    }

    pub async fn is_subscribed(&self, channel_id: &str) -> Result<bool> {
        self.repository.is_subscribed(channel_id).await
    }

    pub async fn channels(&self) -> Result<Vec<Channel>> {
        self.repository.get_channels().await
    }

    pub async fn channels_with_tag(&self, tag: &str, exclude_muted: bool) -> Result<Vec<Channel>> {
        self.repository
            .channels_with_tag(&tag.trim().to_lowercase(), exclude_muted)
            .await
    }

    pub async fn all_tags(&self) -> Result<Vec<String>> {
        self.repository.all_tags().await
    }

    pub async fn tags_for_channel(&self, channel_id: &str) -> Result<Vec<String>> {
        self.repository.tags_for_channel(channel_id).await
    }

    /// Names for an unsubscribe confirmation listing.
    pub async fn channel_names(&self, channel_ids: &[impl AsRef<str>]) -> Result<Vec<(String, String)>> {
        self.repository.channel_names(to_owned_ids(channel_ids)).await
    }

    pub async fn videos(&self, limit: u32, offset: u32) -> Result<Vec<VideoEntry>> {
        self.repository.get_videos(limit, offset).await
    }

    /// Channels grouped by tag, each listing its other tags, followed by a
    /// group of untagged channels when there are any.
    pub async fn tag_groups(&self) -> Result<Vec<TagGroup>> {
        let mut groups = Vec::new();

        for tag in self.repository.all_tags().await? {
            let mut channels = Vec::new();
            for channel in self.repository.channels_with_tag(&tag, false).await? {
                let other_tags = self
                    .repository
                    .tags_for_channel(&channel.channel_id)
                    .await?
                    .into_iter()
                    .filter(|t| *t != tag)
                    .collect();
                channels.push(TaggedChannel { channel, other_tags });
            }
            groups.push(TagGroup {
                tag: Some(tag),
                channels,
            });
        }

        let untagged = self.repository.untagged_channels().await?;
        if !untagged.is_empty() {
            groups.push(TagGroup {
                tag: None,
                channels: untagged
                    .into_iter()
                    .map(|channel| TaggedChannel {
                        channel,
                        other_tags: Vec::new(),
                    })
                    .collect(),
            });
        }

        Ok(groups)
    }
}
