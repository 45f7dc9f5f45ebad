//! Request and response payloads for the Miniflux v1 API.
//!
//! Only the fields sift reads or writes are modeled; serde skips the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A subscribed feed, as returned by `GET /v1/feeds/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Feed {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    /// `|`-joined block patterns. Absent, null or empty means no rules.
    #[serde(default)]
    pub blocklist_rules: Option<String>,
    /// `|`-joined keep patterns.
    #[serde(default)]
    pub keeplist_rules: Option<String>,
}

/// Read state of an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    Unread,
    Read,
    Removed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Enclosure {
    pub url: String,
    #[serde(default)]
    pub mime_type: String,
}

/// The feed summary embedded in each entry.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryFeed {
    pub id: i64,
    #[serde(default)]
    pub title: String,
}

/// One article belonging to a feed.
#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    pub id: i64,
    #[serde(default)]
    pub feed_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub status: EntryStatus,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub enclosures: Option<Vec<Enclosure>>,
    #[serde(default)]
    pub feed: Option<EntryFeed>,
}

impl Entry {
    /// Id of the feed this entry belongs to. `feed_id` is preferred; the
    /// embedded feed is used when it is missing. Miniflux ids start at 1.
    pub fn owning_feed_id(&self) -> Option<i64> {
        Some(self.feed_id)
            .filter(|id| *id > 0)
            .or_else(|| self.feed.as_ref().map(|feed| feed.id).filter(|id| *id > 0))
    }
}

/// One page of entries. Miniflux sends `"entries": null` for empty results on some versions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntriesPage {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub entries: Option<Vec<Entry>>,
}

impl EntriesPage {
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries.unwrap_or_default()
    }
}

/// Partial update body for `PUT /v1/feeds/{id}`. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedRulesUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocklist_rules: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keeplist_rules: Option<String>,
}

/// Body for `PUT /v1/entries`.
#[derive(Debug, Serialize)]
pub struct EntryStatusUpdate<'a> {
    pub entry_ids: &'a [i64],
    pub status: EntryStatus,
}

/// Error body the server attaches to non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error_message: Option<String>,
}
