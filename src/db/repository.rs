use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{Channel, NewVideo, VideoEntry};

use super::schema::SCHEMA;

const CHANNEL_COLUMNS: &str =
    "id, yt_channel_id, channel_name, time_last_checked, muted, upload_frequency";

/// Handle to the subscription database. Cloning shares the same connection.
#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Channel operations

    /// Inserts channels that are not yet subscribed. Existing rows keep their
    /// name, tags and last-checked time.
    pub async fn subscribe(&self, channels: Vec<(String, String)>) -> Result<usize> {
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut inserted = 0;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT OR IGNORE INTO subscribed_channels (yt_channel_id, channel_name, time_last_checked)
                         VALUES (?1, ?2, 0)",
                    )?;
                    for (channel_id, channel_name) in &channels {
                        inserted += stmt.execute(params![channel_id, channel_name])?;
                    }
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await?;
        Ok(inserted)
    }

    /// Deletes channels; their videos and tag associations cascade.
    pub async fn unsubscribe(&self, channel_ids: Vec<String>) -> Result<usize> {
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut deleted = 0;
                {
                    let mut stmt =
                        tx.prepare_cached("DELETE FROM subscribed_channels WHERE yt_channel_id = ?1")?;
                    for channel_id in &channel_ids {
                        deleted += stmt.execute(params![channel_id])?;
                    }
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }

    pub async fn is_subscribed(&self, channel_id: &str) -> Result<bool> {
        let channel_id = channel_id.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM subscribed_channels WHERE yt_channel_id = ?1 LIMIT 1)",
                    params![channel_id],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await?;
        Ok(exists)
    }

    pub async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        let channel_id = channel_id.to_string();
        let channel = self
            .conn
            .call(move |conn| {
                let channel = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM subscribed_channels WHERE yt_channel_id = ?1",
                            CHANNEL_COLUMNS
                        ),
                        params![channel_id],
                        channel_from_row,
                    )
                    .optional()?;
                Ok(channel)
            })
            .await?;
        Ok(channel)
    }

    pub async fn get_channels(&self) -> Result<Vec<Channel>> {
        self.query_channels(
            format!(
                "SELECT {} FROM subscribed_channels ORDER BY channel_name COLLATE NOCASE",
                CHANNEL_COLUMNS
            ),
            None,
        )
        .await
    }

    pub async fn unmuted_channels(&self) -> Result<Vec<Channel>> {
        self.query_channels(
            format!(
                "SELECT {} FROM subscribed_channels WHERE muted = 0 ORDER BY channel_name COLLATE NOCASE",
                CHANNEL_COLUMNS
            ),
            None,
        )
        .await
    }

    pub async fn channels_with_tag(&self, tag: &str, exclude_muted: bool) -> Result<Vec<Channel>> {
        let mut sql = format!(
            r#"SELECT {} FROM subscribed_channels
               WHERE id IN (SELECT sql_channel_id FROM tag_associations WHERE tag = ?1)"#,
            CHANNEL_COLUMNS
        );
        if exclude_muted {
            sql.push_str(" AND muted = 0");
        }
        sql.push_str(" ORDER BY channel_name COLLATE NOCASE");
        self.query_channels(sql, Some(tag.to_string())).await
    }

    pub async fn untagged_channels(&self) -> Result<Vec<Channel>> {
        self.query_channels(
            format!(
                r#"SELECT {} FROM subscribed_channels
                   WHERE id NOT IN (SELECT sql_channel_id FROM tag_associations)
                   ORDER BY channel_name COLLATE NOCASE"#,
                CHANNEL_COLUMNS
            ),
            None,
        )
        .await
    }

    async fn query_channels(&self, sql: String, tag: Option<String>) -> Result<Vec<Channel>> {
        let channels = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = match tag {
                    Some(tag) => stmt.query_map(params![tag], channel_from_row)?,
                    None => stmt.query_map([], channel_from_row)?,
                };
                let channels = rows.collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(channels)
            })
            .await?;
        Ok(channels)
    }

    /// Returns `(channel_id, name)` for each id that is subscribed, in input order.
    pub async fn channel_names(&self, channel_ids: Vec<String>) -> Result<Vec<(String, String)>> {
        let names = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT channel_name FROM subscribed_channels WHERE yt_channel_id = ?1",
                )?;
                let mut names = Vec::with_capacity(channel_ids.len());
                for channel_id in channel_ids {
                    let name: Option<String> = stmt
                        .query_row(params![channel_id], |row| row.get(0))
                        .optional()?;
                    if let Some(name) = name {
                        names.push((channel_id, name));
                    }
                }
                Ok(names)
            })
            .await?;
        Ok(names)
    }

    pub async fn set_muted(&self, channel_ids: Vec<String>, muted: bool) -> Result<usize> {
        let updated = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut updated = 0;
                {
                    let mut stmt = tx.prepare_cached(
                        "UPDATE subscribed_channels SET muted = ?1 WHERE yt_channel_id = ?2",
                    )?;
                    for channel_id in &channel_ids {
                        updated += stmt.execute(params![muted, channel_id])?;
                    }
                }
                tx.commit()?;
                Ok(updated)
            })
            .await?;
        Ok(updated)
    }

    // Tag operations

    pub async fn add_tags(&self, channel_ids: Vec<String>, tags: Vec<String>) -> Result<usize> {
        let added = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut added = 0;
                {
                    let mut stmt = tx.prepare_cached(
                        r#"INSERT OR IGNORE INTO tag_associations (tag, sql_channel_id)
                           SELECT ?1, id FROM subscribed_channels WHERE yt_channel_id = ?2"#,
                    )?;
                    for tag in &tags {
                        for channel_id in &channel_ids {
                            added += stmt.execute(params![tag, channel_id])?;
                        }
                    }
                }
                tx.commit()?;
                Ok(added)
            })
            .await?;
        Ok(added)
    }

    pub async fn remove_tags(&self, channel_ids: Vec<String>, tags: Vec<String>) -> Result<usize> {
        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut removed = 0;
                {
                    let mut stmt = tx.prepare_cached(
                        r#"DELETE FROM tag_associations
                           WHERE tag = ?1 AND sql_channel_id = (
                               SELECT id FROM subscribed_channels WHERE yt_channel_id = ?2
                           )"#,
                    )?;
                    for tag in &tags {
                        for channel_id in &channel_ids {
                            removed += stmt.execute(params![tag, channel_id])?;
                        }
                    }
                }
                tx.commit()?;
                Ok(removed)
            })
            .await?;
        Ok(removed)
    }

    pub async fn tags_for_channel(&self, channel_id: &str) -> Result<Vec<String>> {
        let channel_id = channel_id.to_string();
        let tags = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT tag FROM tag_associations
                       WHERE sql_channel_id = (
                           SELECT id FROM subscribed_channels WHERE yt_channel_id = ?1
                       )
                       ORDER BY tag"#,
                )?;
                let tags = stmt
                    .query_map(params![channel_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(tags)
            })
            .await?;
        Ok(tags)
    }

    pub async fn all_tags(&self) -> Result<Vec<String>> {
        let tags = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT DISTINCT tag FROM tag_associations ORDER BY tag")?;
                let tags = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(tags)
            })
            .await?;
        Ok(tags)
    }

    // Video operations

    /// Stores the result of one poll: every video is inserted if absent and
    /// the channel's last-checked time is advanced, all in one transaction.
    pub async fn record_poll(
        &self,
        channel_id: &str,
        videos: Vec<NewVideo>,
        checked_at: i64,
    ) -> Result<usize> {
        let lookup_id = channel_id.to_string();
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let sql_channel_id: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM subscribed_channels WHERE yt_channel_id = ?1",
                        params![lookup_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(sql_channel_id) = sql_channel_id else {
                    return Ok(None);
                };

                let mut inserted = 0;
                {
                    let mut stmt = tx.prepare_cached(
                        r#"INSERT OR IGNORE INTO videos (sql_channel_id, video_id, title, duration, time_published, description)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                    )?;
                    for video in &videos {
                        inserted += stmt.execute(params![
                            sql_channel_id,
                            video.video_id,
                            video.title,
                            video.duration,
                            video.published_at,
                            video.description,
                        ])?;
                    }
                }
                tx.execute(
                    "UPDATE subscribed_channels SET time_last_checked = MAX(time_last_checked, ?1) WHERE id = ?2",
                    params![checked_at, sql_channel_id],
                )?;
                tx.commit()?;
                Ok(Some(inserted))
            })
            .await?;

        inserted.ok_or_else(|| AppError::ChannelNotFound(channel_id.to_string()))
    }

    /// Newest videos first across all subscriptions.
    pub async fn get_videos(&self, limit: u32, offset: u32) -> Result<Vec<VideoEntry>> {
        let videos = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT v.video_id, v.title, v.duration, v.time_published,
                              c.yt_channel_id, c.channel_name
                       FROM videos v
                       INNER JOIN subscribed_channels c ON v.sql_channel_id = c.id
                       ORDER BY v.time_published DESC
                       LIMIT ?1 OFFSET ?2"#,
                )?;
                let videos = stmt
                    .query_map(params![limit, offset], video_entry_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(videos)
            })
            .await?;
        Ok(videos)
    }

    pub async fn count_videos(&self, channel_id: &str) -> Result<i64> {
        let channel_id = channel_id.to_string();
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    r#"SELECT COUNT(*) FROM videos
                       WHERE sql_channel_id = (
                           SELECT id FROM subscribed_channels WHERE yt_channel_id = ?1
                       )"#,
                    params![channel_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }
}

fn channel_from_row(row: &Row) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        name: row.get(2)?,
        last_checked: row.get(3)?,
        muted: row.get::<_, i64>(4)? != 0,
        upload_frequency: row.get(5)?,
    })
}

fn video_entry_from_row(row: &Row) -> rusqlite::Result<VideoEntry> {
    Ok(VideoEntry {
        video_id: row.get(0)?,
        title: row.get(1)?,
        duration: row.get(2)?,
        published_at: row.get(3)?,
        channel_id: row.get(4)?,
        channel_name: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(id: &str, name: &str) -> (String, String) {
        (id.to_string(), name.to_string())
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn video(id: &str, published_at: i64) -> NewVideo {
        NewVideo {
            video_id: id.to_string(),
            title: format!("Title {}", id),
            duration: "3:00".to_string(),
            published_at,
            description: None,
        }
    }

    #[tokio::test]
    async fn subscribe_is_insert_if_absent() {
        let repo = Repository::in_memory().await.unwrap();

        let inserted = repo
            .subscribe(vec![pair("UC1", "First"), pair("UC2", "Second")])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        repo.record_poll("UC1", vec![], 1_000).await.unwrap();
        let again = repo.subscribe(vec![pair("UC1", "Renamed")]).await.unwrap();
        assert_eq!(again, 0);

        let channel = repo.get_channel("UC1").await.unwrap().unwrap();
        assert_eq!(channel.name, "First");
        assert_eq!(channel.last_checked, 1_000);

        let fresh = repo.get_channel("UC2").await.unwrap().unwrap();
        assert!(fresh.never_checked());
        assert!(!fresh.muted);
    }

    #[tokio::test]
    async fn unsubscribe_cascades_to_videos_and_tags() {
        let repo = Repository::in_memory().await.unwrap();
        repo.subscribe(vec![pair("UC1", "One"), pair("UC2", "Two")]).await.unwrap();
        repo.record_poll("UC1", vec![video("v1", 100), video("v2", 90)], 200)
            .await
            .unwrap();
        repo.record_poll("UC2", vec![video("v3", 80)], 200).await.unwrap();
        repo.add_tags(ids(&["UC1"]), ids(&["music"])).await.unwrap();

        let deleted = repo.unsubscribe(ids(&["UC1"])).await.unwrap();
        assert_eq!(deleted, 1);

        assert!(!repo.is_subscribed("UC1").await.unwrap());
        assert_eq!(repo.count_videos("UC1").await.unwrap(), 0);
        assert!(repo.all_tags().await.unwrap().is_empty());

        let remaining = repo.get_videos(10, 0).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].video_id, "v3");
    }

    #[tokio::test]
    async fn record_poll_keeps_first_seen_rows() {
        let repo = Repository::in_memory().await.unwrap();
        repo.subscribe(vec![pair("UC1", "One")]).await.unwrap();

        let first = repo
            .record_poll("UC1", vec![video("v1", 100), video("v2", 99)], 150)
            .await
            .unwrap();
        assert_eq!(first, 2);

        let second = repo
            .record_poll("UC1", vec![video("v1", 500), video("v2", 499)], 600)
            .await
            .unwrap();
        assert_eq!(second, 0);

        let videos = repo.get_videos(10, 0).await.unwrap();
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].video_id, "v1");
        assert_eq!(videos[0].published_at, 100);
        assert_eq!(videos[0].channel_name, "One");

        let channel = repo.get_channel("UC1").await.unwrap().unwrap();
        assert_eq!(channel.last_checked, 600);
    }

    #[tokio::test]
    async fn record_poll_never_moves_last_checked_backwards() {
        let repo = Repository::in_memory().await.unwrap();
        repo.subscribe(vec![pair("UC1", "One")]).await.unwrap();

        repo.record_poll("UC1", vec![], 500).await.unwrap();
        repo.record_poll("UC1", vec![], 400).await.unwrap();

        let channel = repo.get_channel("UC1").await.unwrap().unwrap();
        assert_eq!(channel.last_checked, 500);
    }

    #[tokio::test]
    async fn record_poll_rejects_unknown_channel() {
        let repo = Repository::in_memory().await.unwrap();

        let err = repo
            .record_poll("UCmissing", vec![video("v1", 1)], 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ChannelNotFound(id) if id == "UCmissing"));
        assert!(repo.get_videos(10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tags_disappear_with_last_association() {
        let repo = Repository::in_memory().await.unwrap();
        repo.subscribe(vec![pair("UC1", "One"), pair("UC2", "Two")]).await.unwrap();

        repo.add_tags(ids(&["UC1", "UC2"]), ids(&["music"])).await.unwrap();
        // duplicate tagging is a no-op
        let dup = repo.add_tags(ids(&["UC1"]), ids(&["music"])).await.unwrap();
        assert_eq!(dup, 0);

        repo.remove_tags(ids(&["UC1"]), ids(&["music"])).await.unwrap();
        assert!(repo.tags_for_channel("UC1").await.unwrap().is_empty());
        assert_eq!(repo.all_tags().await.unwrap(), vec!["music".to_string()]);

        repo.remove_tags(ids(&["UC2"]), ids(&["music"])).await.unwrap();
        assert!(repo.all_tags().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn channel_listings_sort_case_insensitively_and_filter_muted() {
        let repo = Repository::in_memory().await.unwrap();
        repo.subscribe(vec![
            pair("UC1", "beta"),
            pair("UC2", "Alpha"),
            pair("UC3", "gamma"),
        ])
        .await
        .unwrap();
        repo.add_tags(ids(&["UC1", "UC2"]), ids(&["news"])).await.unwrap();
        repo.set_muted(ids(&["UC2"]), true).await.unwrap();

        let names: Vec<_> = repo
            .get_channels()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "beta", "gamma"]);

        let tagged = repo.channels_with_tag("news", false).await.unwrap();
        assert_eq!(tagged.len(), 2);
        assert!(tagged[0].muted);

        let audible = repo.channels_with_tag("news", true).await.unwrap();
        assert_eq!(audible.len(), 1);
        assert_eq!(audible[0].channel_id, "UC1");

        let unmuted: Vec<_> = repo
            .unmuted_channels()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.channel_id)
            .collect();
        assert_eq!(unmuted, vec!["UC1", "UC3"]);

        let untagged = repo.untagged_channels().await.unwrap();
        assert_eq!(untagged.len(), 1);
        assert_eq!(untagged[0].channel_id, "UC3");
    }

    #[tokio::test]
    async fn videos_are_paginated_newest_first() {
        let repo = Repository::in_memory().await.unwrap();
        repo.subscribe(vec![pair("UC1", "One")]).await.unwrap();
        let batch = (0..5).map(|i| video(&format!("v{}", i), 100 - i)).collect();
        repo.record_poll("UC1", batch, 200).await.unwrap();

        let page: Vec<_> = repo
            .get_videos(2, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.video_id)
            .collect();
        assert_eq!(page, vec!["v2", "v3"]);
    }

    #[tokio::test]
    async fn channel_names_skips_unknown_ids() {
        let repo = Repository::in_memory().await.unwrap();
        repo.subscribe(vec![pair("UC1", "One")]).await.unwrap();

        let names = repo.channel_names(ids(&["UC1", "UCx"])).await.unwrap();
        assert_eq!(names, vec![pair("UC1", "One")]);
    }
}
