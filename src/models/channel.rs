use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub channel_id: String,
    pub name: String,
    /// Seconds since epoch; 0 until the first poll.
    pub last_checked: i64,
    pub muted: bool,
    pub upload_frequency: Option<i64>,
}

impl Channel {
    pub fn never_checked(&self) -> bool {
        self.last_checked == 0
    }
}

/// A channel row in the grouped subscription manager view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedChannel {
    pub channel: Channel,
    /// Tags other than the one the group is keyed by.
    pub other_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagGroup {
    /// `None` for the trailing group of untagged channels.
    pub tag: Option<String>,
    pub channels: Vec<TaggedChannel>,
}

impl TagGroup {
    pub fn label(&self) -> &str {
        self.tag.as_deref().unwrap_or("No tags")
    }
}
