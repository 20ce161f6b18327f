//! Persistent domain records: groups, channels, and the relay ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One source group and its relay configuration.
///
/// Created on the first tag binding, mutated when further bindings are
/// added, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub chat_id: i64,
    /// Lowercase tag -> destination channel ids.
    #[serde(default)]
    pub tags: HashMap<String, TagTargets>,
    #[serde(default)]
    pub settings: GroupSettings,
}

impl Group {
    #[must_use]
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            tags: HashMap::new(),
            settings: GroupSettings::default(),
        }
    }

    /// Bind a tag to a destination channel. The tag key is lowercased and
    /// the channel list stays ordered and duplicate-free; a legacy scalar
    /// value is migrated to a list in place.
    pub fn bind(&mut self, tag: &str, channel_id: i64) {
        let key = tag.trim_start_matches('#').to_lowercase();
        let mut channels = self
            .tags
            .remove(&key)
            .map(|targets| targets.into_channels())
            .unwrap_or_default();
        if !channels.contains(&channel_id) {
            channels.push(channel_id);
        }
        self.tags.insert(key, TagTargets::Many(channels));
    }
}

/// Per-group relay behavior flags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GroupSettings {
    /// Forward natively instead of reconstructing the message.
    #[serde(default = "default_true")]
    pub forwards: bool,
    /// Attach a "Go to message" link on re-sent copies.
    #[serde(default)]
    pub link: bool,
    /// Seed a comment before re-sending photos and plain text.
    #[serde(default)]
    pub comments: bool,
    /// Attach a like-vote row on re-sent copies.
    #[serde(default)]
    pub likes: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            forwards: true,
            link: false,
            comments: false,
            likes: false,
        }
    }
}

/// Value shape of one tag binding at the storage boundary.
///
/// Early deployments stored a single channel id per tag; current data stores
/// a list. Both shapes deserialize, and every read normalizes to a list
/// before the value leaves the tag router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagTargets {
    Many(Vec<i64>),
    Single(i64),
}

impl TagTargets {
    /// Ordered, de-duplicated channel list.
    #[must_use]
    pub fn channels(&self) -> Vec<i64> {
        match self {
            Self::Single(id) => vec![*id],
            Self::Many(ids) => {
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    if !out.contains(id) {
                        out.push(*id);
                    }
                }
                out
            }
        }
    }

    /// Consuming variant of [`TagTargets::channels`].
    #[must_use]
    pub fn into_channels(self) -> Vec<i64> {
        self.channels()
    }
}

/// One destination channel known to the bot. Read-only from the relay
/// engine's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub chat_id: i64,
    pub title: String,
    /// Users authorized to bind tags to this channel.
    #[serde(default)]
    pub admins: Vec<i64>,
}

/// One relayed copy: maps a source message to its destination copy.
///
/// Records are append-only; a fallback re-relay appends a fresh record and
/// leaves the stale one in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRecord {
    /// Source chat id.
    pub chat_id: i64,
    /// Source message id.
    pub message_id: i32,
    /// Destination channel id.
    pub channel_id: i64,
    /// Message id of the relayed copy inside the destination channel.
    pub channel_message_id: i32,
    pub relayed_at: DateTime<Utc>,
}

impl RelayRecord {
    #[must_use]
    pub fn new(chat_id: i64, message_id: i32, channel_id: i64, channel_message_id: i32) -> Self {
        Self {
            chat_id,
            message_id,
            channel_id,
            channel_message_id,
            relayed_at: Utc::now(),
        }
    }
}
