use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{AppError, Result};
use crate::queue::{Job, RateLimitedQueue};
use crate::services::ThumbnailSource;

const EXTENSION: &str = "jpg";

/// Video ids double as file names, so only the upstream id alphabet is
/// accepted.
pub fn is_valid_video_id(video_id: &str) -> bool {
    !video_id.is_empty()
        && video_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailState {
    Cached,
    Downloading,
    Missing,
}

impl ThumbnailState {
    /// Whether a page may reference the thumbnail now: it is either on disk
    /// or will be shortly.
    pub fn is_available(self) -> bool {
        matches!(self, ThumbnailState::Cached | ThumbnailState::Downloading)
    }
}

/// What is known about every thumbnail, without touching the filesystem
/// after startup. Absent ids are `Missing`.
pub struct ThumbnailCache {
    dir: PathBuf,
    states: DashMap<String, ThumbnailState>,
    // outstanding tickets
    downloading: AtomicUsize,
}

impl ThumbnailCache {
    /// Opens the cache directory, creating it if needed, and records every
    /// thumbnail already on disk.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let states = DashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                states.insert(stem.to_string(), ThumbnailState::Cached);
            }
        }
        tracing::info!("Found {} cached thumbnails in {:?}", states.len(), dir);

        Ok(Self {
            dir,
            states,
            downloading: AtomicUsize::new(0),
        })
    }

    pub fn state(&self, video_id: &str) -> ThumbnailState {
        self.states
            .get(video_id)
            .map(|state| *state)
            .unwrap_or(ThumbnailState::Missing)
    }

    pub fn is_available(&self, video_id: &str) -> bool {
        self.state(video_id).is_available()
    }

    pub fn path_for(&self, video_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", video_id, EXTENSION))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn downloading(&self) -> usize {
        self.downloading.load(Ordering::Acquire)
    }

    /// Claims a missing thumbnail for download. Ids that are not safe as a
    /// file name are refused.
    pub fn try_acquire(self: &Arc<Self>, video_id: &str) -> Option<ThumbnailTicket> {
        if !is_valid_video_id(video_id) {
            tracing::warn!("Refusing thumbnail for malformed video id {:?}", video_id);
            return None;
        }
        match self.states.entry(video_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                vacant.insert(ThumbnailState::Downloading);
                self.downloading.fetch_add(1, Ordering::AcqRel);
                Some(ThumbnailTicket {
                    cache: Arc::clone(self),
                    video_id: video_id.to_string(),
                    completed: false,
                })
            }
        }
    }
}

/// A claimed download. Completing it marks the thumbnail cached; dropping it
/// otherwise returns the id to `Missing` so a later request can retry.
pub struct ThumbnailTicket {
    cache: Arc<ThumbnailCache>,
    video_id: String,
    completed: bool,
}

impl ThumbnailTicket {
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn complete(mut self) {
        self.completed = true;
        self.cache
            .states
            .insert(self.video_id.clone(), ThumbnailState::Cached);
    }
}

impl Drop for ThumbnailTicket {
    fn drop(&mut self) {
        if !self.completed {
            self.cache
                .states
                .remove_if(&self.video_id, |_, state| *state == ThumbnailState::Downloading);
        }
        self.cache.downloading.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Producer side: claims thumbnails and queues them for the download workers.
pub struct Thumbnails {
    cache: Arc<ThumbnailCache>,
    queue: Arc<RateLimitedQueue<ThumbnailTicket>>,
}

impl Thumbnails {
    pub fn new(cache: Arc<ThumbnailCache>, queue: Arc<RateLimitedQueue<ThumbnailTicket>>) -> Self {
        Self { cache, queue }
    }

    /// Queues every id that is neither cached nor already downloading.
    /// Returns how many were queued.
    pub fn request<I, S>(&self, video_ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut queued = 0;
        for video_id in video_ids {
            if let Some(ticket) = self.cache.try_acquire(video_id.as_ref()) {
                self.queue.put(ticket);
                queued += 1;
            }
        }
        queued
    }

    pub fn cache(&self) -> &Arc<ThumbnailCache> {
        &self.cache
    }
}

/// Worker job that downloads one thumbnail into the cache directory.
pub struct ThumbnailDownloader {
    cache: Arc<ThumbnailCache>,
    source: Arc<dyn ThumbnailSource>,
}

impl ThumbnailDownloader {
    pub fn new(cache: Arc<ThumbnailCache>, source: Arc<dyn ThumbnailSource>) -> Self {
        Self { cache, source }
    }
}

#[async_trait]
impl Job<ThumbnailTicket> for ThumbnailDownloader {
    async fn run(&self, ticket: ThumbnailTicket) -> Result<()> {
        let video_id = ticket.video_id().to_string();

        let bytes = self
            .source
            .fetch_thumbnail(&video_id)
            .await
            .map_err(|e| match e {
                AppError::ThumbnailFetch { .. } => e,
                other => AppError::ThumbnailFetch {
                    video_id: video_id.clone(),
                    reason: other.to_string(),
                },
            })?
            .ok_or_else(|| AppError::ThumbnailFetch {
                video_id: video_id.clone(),
                reason: "not found".to_string(),
            })?;

        let path = self.cache.path_for(&video_id);
        let partial = path.with_extension(format!("{}.part", EXTENSION));
        if let Err(e) = write_atomically(&partial, &path, &bytes).await {
            match tokio::fs::remove_file(&partial).await {
                Ok(()) => {}
                Err(cleanup) if cleanup.kind() == std::io::ErrorKind::NotFound => {}
                Err(cleanup) => {
                    tracing::warn!("Failed to remove {:?}: {}", partial, cleanup)
                }
            }
            return Err(e.into());
        }

        ticket.complete();
        tracing::debug!("Saved thumbnail {}", video_id);
        Ok(())
    }
}

async fn write_atomically(partial: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(partial, bytes).await?;
    tokio::fs::rename(partial, path).await
}
