//! Thumbnail preview lookup for listed entries.
//!
//! Only resolves *which* image would serve as a preview. Fetching and drawing
//! the image is left to whatever front end shows it.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use url::Url;

use crate::api::Entry;
use crate::watch::{EntryListEvents, SubscriptionId};

fn img_src_regex() -> Option<&'static Regex> {
    static IMG_SRC: OnceLock<Option<Regex>> = OnceLock::new();
    IMG_SRC
        .get_or_init(|| Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).ok())
        .as_ref()
}

/// Absolute http(s) form of `candidate`, resolved against the entry URL when relative.
fn absolute_http_url(candidate: &str, entry_url: Option<&str>) -> Option<Url> {
    let candidate = candidate.trim();
    let url = match Url::parse(candidate) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(entry_url?).ok()?.join(candidate).ok()?
        }
        Err(_) => return None,
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Preview image for an entry: the first image enclosure, else the first
/// `<img src>` in its content.
pub fn resolve_thumbnail(entry: &Entry) -> Option<String> {
    let entry_url = entry.url.as_deref();

    let from_enclosure = entry.enclosures.iter().flatten().find_map(|enclosure| {
        enclosure
            .mime_type
            .starts_with("image/")
            .then(|| absolute_http_url(&enclosure.url, entry_url))
            .flatten()
    });
    if let Some(url) = from_enclosure {
        return Some(url.to_string());
    }

    let content = entry.content.as_deref()?;
    img_src_regex()?
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .find_map(|src| absolute_http_url(src.as_str(), entry_url))
        .map(|url| url.to_string())
}

/// Thumbnail URLs keyed by entry id, filled from [`EntryListEvents`].
#[derive(Debug, Clone, Default)]
pub struct ThumbnailIndex {
    inner: Arc<Mutex<HashMap<i64, String>>>,
}

impl ThumbnailIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve thumbnails for every entry published from now on.
    pub fn attach(&self, events: &mut EntryListEvents) -> SubscriptionId {
        let inner = self.inner.clone();
        events.subscribe(move |added| {
            let Ok(mut map) = inner.lock() else {
                tracing::warn!("Thumbnail index lock poisoned, skipping");
                return;
            };
            for entry in added {
                if let Some(url) = resolve_thumbnail(entry) {
                    map.insert(entry.id, url);
                }
            }
        })
    }

    pub fn get(&self, entry_id: i64) -> Option<String> {
        self.inner.lock().ok()?.get(&entry_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
