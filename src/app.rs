use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::feed::Poller;
use crate::models::Channel;
use crate::queue::{DedupQueue, RateLimitedQueue, WorkerPool};
use crate::services::{
    parse_tag_list, ChannelSource, HttpThumbnailSource, InvidiousClient, SubscriptionManager,
    ThumbnailCache, ThumbnailDownloader, ThumbnailSource, ThumbnailState, Thumbnails,
};

const IDLE_POLL: Duration = Duration::from_millis(50);

/// Owns the queues and workers and exposes the triggers that feed them.
pub struct App {
    pub subscriptions: SubscriptionManager,
    repository: Repository,
    channel_checks: Arc<DedupQueue>,
    thumbnails: Arc<Thumbnails>,
    // display names for log lines, filled when channels are queued and
    // pruned on unsubscribe
    channel_names: Arc<DashMap<String, String>>,
    pools: Vec<WorkerPool>,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;
        let source = Arc::new(InvidiousClient::new(&config.upstream_url)?);
        let thumbnail_source = Arc::new(HttpThumbnailSource::new(&config.thumbnail_url)?);

        Self::with_sources(config, repository, source, thumbnail_source)
    }

    /// Builds the app around the given upstream clients and starts the
    /// worker pools. Must be called from within a tokio runtime.
    pub fn with_sources(
        config: &Config,
        repository: Repository,
        source: Arc<dyn ChannelSource>,
        thumbnail_source: Arc<dyn ThumbnailSource>,
    ) -> Result<Self> {
        let cache = Arc::new(ThumbnailCache::open(&config.thumbnails_dir)?);
        let thumbnail_queue = Arc::new(RateLimitedQueue::new(config.thumbnail_interval()));
        let thumbnails = Arc::new(Thumbnails::new(
            Arc::clone(&cache),
            Arc::clone(&thumbnail_queue),
        ));

        let check_queue = Arc::new(RateLimitedQueue::new(config.channel_check_interval()));
        let channel_checks = Arc::new(DedupQueue::new(Arc::clone(&check_queue)));
        let channel_names = Arc::new(DashMap::new());

        let poller = Arc::new(Poller::new(
            repository.clone(),
            source,
            Arc::clone(&thumbnails),
            Arc::clone(&channel_names),
        ));
        let downloader = Arc::new(ThumbnailDownloader::new(cache, thumbnail_source));

        let pools = vec![
            WorkerPool::spawn("channel-checks", config.workers, check_queue, poller),
            WorkerPool::spawn("thumbnails", config.workers, thumbnail_queue, downloader),
        ];

        Ok(Self {
            subscriptions: SubscriptionManager::new(repository.clone()),
            repository,
            channel_checks,
            thumbnails,
            channel_names,
            pools,
        })
    }

    /// Queues every unmuted channel. Returns how many were newly queued.
    pub async fn check_all(&self) -> Result<usize> {
        let channels = self.repository.unmuted_channels().await?;
        Ok(self.enqueue_channels(channels))
    }

    /// Queues the unmuted channels carrying any of `tags`.
    pub async fn check_by_tags(&self, tags: &[impl AsRef<str>]) -> Result<usize> {
        let mut channels = Vec::new();
        for tag in tags {
            for tag in parse_tag_list(tag.as_ref()) {
                channels.extend(self.repository.channels_with_tag(&tag, true).await?);
            }
        }
        Ok(self.enqueue_channels(channels))
    }

    /// Queues specific channels, muted or not. Ids that are not subscribed
    /// are ignored.
    pub async fn check_channels(&self, channel_ids: &[impl AsRef<str>]) -> Result<usize> {
        let mut channels = Vec::new();
        for channel_id in channel_ids {
            match self.repository.get_channel(channel_id.as_ref()).await? {
                Some(channel) => channels.push(channel),
                None => tracing::warn!("Not checking unknown channel {}", channel_id.as_ref()),
            }
        }
        Ok(self.enqueue_channels(channels))
    }

    /// Unsubscribes through the manager and forgets the channels' log names.
    pub async fn unsubscribe(&self, channel_ids: &[impl AsRef<str>]) -> Result<usize> {
        let removed = self.subscriptions.unsubscribe(channel_ids).await?;
        for channel_id in channel_ids {
            self.channel_names.remove(channel_id.as_ref());
        }
        Ok(removed)
    }

    fn enqueue_channels(&self, channels: Vec<Channel>) -> usize {
        let mut queued = 0;
        for channel in channels {
            self.channel_names
                .insert(channel.channel_id.clone(), channel.name);
            if self.channel_checks.try_enqueue(&channel.channel_id) {
                queued += 1;
            }
        }
        if queued > 0 {
            tracing::info!("Queued {} channels for checking", queued);
        }
        queued
    }

    pub fn is_checking(&self, channel_id: &str) -> bool {
        self.channel_checks.is_pending(channel_id)
    }

    pub fn is_refreshing(&self) -> bool {
        self.channel_checks.in_flight() > 0
    }

    pub fn thumbnail_state(&self, video_id: &str) -> ThumbnailState {
        self.thumbnails.cache().state(video_id)
    }

    pub fn thumbnail_path(&self, video_id: &str) -> PathBuf {
        self.thumbnails.cache().path_for(video_id)
    }

    /// Resolves once no channel check or thumbnail download is outstanding.
    pub async fn wait_idle(&self) {
        while self.channel_checks.in_flight() > 0 || self.thumbnails.cache().downloading() > 0 {
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    pub fn shutdown(&self) {
        for pool in &self.pools {
            pool.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::models::UpstreamVideo;

    struct ScriptedSource {
        listing: Vec<UpstreamVideo>,
        calls: Mutex<Vec<String>>,
        gate: Semaphore,
    }

    impl ScriptedSource {
        fn new(listing: Vec<UpstreamVideo>, permits: usize) -> Self {
            Self {
                listing,
                calls: Mutex::new(Vec::new()),
                gate: Semaphore::new(permits),
            }
        }

        fn calls(&self) -> Vec<String> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort();
            calls
        }
    }

    #[async_trait]
    impl ChannelSource for ScriptedSource {
        async fn fetch_channel_videos(&self, channel_id: &str) -> Result<Vec<UpstreamVideo>> {
            self.calls.lock().unwrap().push(channel_id.to_string());
            let _permit = self.gate.acquire().await.map_err(anyhow::Error::from)?;
            Ok(self.listing.clone())
        }
    }

    struct StaticThumbnails;

    #[async_trait]
    impl ThumbnailSource for StaticThumbnails {
        async fn fetch_thumbnail(&self, _video_id: &str) -> Result<Option<Vec<u8>>> {
            Ok(Some(b"jpeg".to_vec()))
        }
    }

    struct Fixture {
        app: App,
        source: Arc<ScriptedSource>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(listing: Vec<UpstreamVideo>, permits: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir.path().join("subs.sqlite").to_string_lossy().to_string(),
            thumbnails_dir: dir.path().join("thumbs").to_string_lossy().to_string(),
            workers: 5,
            channel_check_interval_ms: 5,
            thumbnail_interval_ms: 5,
            ..Config::default()
        };
        let repository = Repository::new(&config.db_path).await.unwrap();
        let source = Arc::new(ScriptedSource::new(listing, permits));
        let app = App::with_sources(&config, repository, source.clone(), Arc::new(StaticThumbnails))
            .unwrap();
        Fixture {
            app,
            source,
            _dir: dir,
        }
    }

    fn pair(id: &str, name: &str) -> (String, String) {
        (id.to_string(), name.to_string())
    }

    fn hello() -> Vec<UpstreamVideo> {
        vec![UpstreamVideo {
            video_id: "v1".to_string(),
            title: "Hello".to_string(),
            duration: "3:00".to_string(),
            published: Some("1 hour ago".to_string()),
            description: None,
        }]
    }

    #[tokio::test]
    async fn subscribe_check_and_thumbnail_end_to_end() {
        let f = fixture(hello(), 100).await;
        f.app
            .subscriptions
            .subscribe(vec![pair("UC_test", "Test Channel")])
            .await
            .unwrap();
        let channel = f.app.repository.get_channel("UC_test").await.unwrap().unwrap();
        assert_eq!(channel.last_checked, 0);

        let now = Utc::now().timestamp();
        assert_eq!(f.app.check_channels(&["UC_test"]).await.unwrap(), 1);
        f.app.wait_idle().await;

        let videos = f.app.subscriptions.videos(60, 0).await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].video_id, "v1");
        assert_eq!(videos[0].title, "Hello");
        assert_eq!(videos[0].channel_name, "Test Channel");
        assert!((videos[0].published_at - (now - 3600)).abs() <= 5);

        let channel = f.app.repository.get_channel("UC_test").await.unwrap().unwrap();
        assert!((channel.last_checked - now).abs() <= 5);

        assert_eq!(f.app.thumbnail_state("v1"), ThumbnailState::Cached);
        assert!(f.app.thumbnail_path("v1").exists());
    }

    #[tokio::test]
    async fn repeated_triggers_check_a_channel_once() {
        let f = fixture(hello(), 0).await;
        f.app
            .subscriptions
            .subscribe(vec![pair("UC1", "One")])
            .await
            .unwrap();

        assert_eq!(f.app.check_channels(&["UC1"]).await.unwrap(), 1);
        assert_eq!(f.app.check_channels(&["UC1"]).await.unwrap(), 0);
        assert_eq!(f.app.check_all().await.unwrap(), 0);
        assert!(f.app.is_checking("UC1"));
        assert!(f.app.is_refreshing());

        f.source.gate.add_permits(10);
        f.app.wait_idle().await;

        assert_eq!(f.source.calls(), vec!["UC1"]);
        assert!(!f.app.is_checking("UC1"));
        assert_eq!(f.app.check_channels(&["UC1"]).await.unwrap(), 1);
        f.app.wait_idle().await;
        assert_eq!(f.source.calls().len(), 2);
    }

    #[tokio::test]
    async fn unsubscribe_forgets_channel_names() {
        let f = fixture(Vec::new(), 100).await;
        f.app
            .subscriptions
            .subscribe(vec![pair("UC1", "One"), pair("UC2", "Two")])
            .await
            .unwrap();
        assert_eq!(f.app.check_all().await.unwrap(), 2);
        f.app.wait_idle().await;
        assert_eq!(f.app.channel_names.len(), 2);

        assert_eq!(f.app.unsubscribe(&["UC1"]).await.unwrap(), 1);

        assert!(f.app.channel_names.get("UC1").is_none());
        assert!(f.app.channel_names.get("UC2").is_some());
        assert!(!f.app.subscriptions.is_subscribed("UC1").await.unwrap());
    }

    #[tokio::test]
    async fn sweeps_skip_muted_channels_but_direct_checks_do_not() {
        let f = fixture(Vec::new(), 100).await;
        let subs = &f.app.subscriptions;
        subs.subscribe(vec![pair("UC1", "One"), pair("UC2", "Two"), pair("UC3", "Three")])
            .await
            .unwrap();
        subs.add_tags(&["UC1", "UC2"], &["news"]).await.unwrap();
        subs.set_muted(&["UC2"], true).await.unwrap();

        assert_eq!(f.app.check_all().await.unwrap(), 2);
        f.app.wait_idle().await;
        assert_eq!(f.source.calls(), vec!["UC1", "UC3"]);

        assert_eq!(f.app.check_by_tags(&["News"]).await.unwrap(), 1);
        f.app.wait_idle().await;
        assert_eq!(f.source.calls(), vec!["UC1", "UC1", "UC3"]);

        assert_eq!(f.app.check_channels(&["UC2", "UCunknown"]).await.unwrap(), 1);
        f.app.wait_idle().await;
        assert_eq!(f.source.calls(), vec!["UC1", "UC1", "UC2", "UC3"]);
    }
}
