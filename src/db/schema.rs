pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- subscribed_channels table
CREATE TABLE IF NOT EXISTS subscribed_channels (
    id INTEGER PRIMARY KEY,
    yt_channel_id TEXT UNIQUE NOT NULL,
    channel_name TEXT NOT NULL,
    time_last_checked INTEGER NOT NULL DEFAULT 0,
    muted INTEGER NOT NULL DEFAULT 0,
    upload_frequency INTEGER
);

-- videos table (rows are never updated after the first poll that sees them)
CREATE TABLE IF NOT EXISTS videos (
    id INTEGER PRIMARY KEY,
    sql_channel_id INTEGER NOT NULL REFERENCES subscribed_channels(id) ON UPDATE CASCADE ON DELETE CASCADE,
    video_id TEXT UNIQUE NOT NULL,
    title TEXT NOT NULL,
    duration TEXT,
    time_published INTEGER NOT NULL,
    description TEXT
);

CREATE INDEX IF NOT EXISTS idx_videos_time_published ON videos(time_published DESC);
CREATE INDEX IF NOT EXISTS idx_videos_channel ON videos(sql_channel_id);

-- tag_associations table
CREATE TABLE IF NOT EXISTS tag_associations (
    id INTEGER PRIMARY KEY,
    tag TEXT NOT NULL,
    sql_channel_id INTEGER NOT NULL REFERENCES subscribed_channels(id) ON UPDATE CASCADE ON DELETE CASCADE,
    UNIQUE(tag, sql_channel_id)
);

CREATE INDEX IF NOT EXISTS idx_tag_associations_channel ON tag_associations(sql_channel_id);
"#;
