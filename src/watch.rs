//! Notifications for entries appearing in the entry list.
//!
//! The browser publishes every reload here; subscribers only ever see entries
//! that were not part of an earlier publish. Subscribers run synchronously in
//! registration order and have no access to rule or triage state.

use std::collections::HashSet;

use crate::api::Entry;

type Subscriber = Box<dyn FnMut(&[Entry]) + Send>;

/// Handle returned by [`EntryListEvents::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(usize);

#[derive(Default)]
pub struct EntryListEvents {
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_id: usize,
    seen: HashSet<i64>,
}

impl EntryListEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&[Entry]) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    /// Report the current list contents. Subscribers are called once with the
    /// entries not seen before, if there are any. Returns how many were new.
    pub fn publish(&mut self, entries: &[Entry]) -> usize {
        let added: Vec<Entry> = entries
            .iter()
            .filter(|entry| self.seen.insert(entry.id))
            .cloned()
            .collect();

        if added.is_empty() {
            return 0;
        }

        tracing::debug!(
            added = added.len(),
            subscribers = self.subscribers.len(),
            "Entries added to list"
        );
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&added);
        }
        added.len()
    }
}

impl std::fmt::Debug for EntryListEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryListEvents")
            .field("subscribers", &self.subscribers.len())
            .field("seen", &self.seen.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::EntryStatus;
    use std::sync::{Arc, Mutex};

    fn entry(id: i64) -> Entry {
        Entry {
            id,
            feed_id: 1,
            title: Some(format!("Entry {id}")),
            content: None,
            url: None,
            status: EntryStatus::Unread,
            published_at: None,
            enclosures: None,
            feed: None,
        }
    }

    fn recorder(events: &mut EntryListEvents) -> (SubscriptionId, Arc<Mutex<Vec<Vec<i64>>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let id = events.subscribe(move |added| {
            sink.lock()
                .unwrap()
                .push(added.iter().map(|e| e.id).collect());
        });
        (id, calls)
    }

    #[test]
    fn test_only_new_entries_are_published() {
        let mut events = EntryListEvents::new();
        let (_, calls) = recorder(&mut events);

        assert_eq!(events.publish(&[entry(1), entry(2)]), 2);
        assert_eq!(events.publish(&[entry(2), entry(3)]), 1);
        assert_eq!(events.publish(&[entry(1), entry(3)]), 0);

        assert_eq!(*calls.lock().unwrap(), vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_subscribers_called_in_order() {
        let mut events = EntryListEvents::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            let order = order.clone();
            events.subscribe(move |_| order.lock().unwrap().push(name));
        }

        events.publish(&[entry(1)]);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_unsubscribe() {
        let mut events = EntryListEvents::new();
        let (id, calls) = recorder(&mut events);

        assert!(events.unsubscribe(id));
        assert!(!events.unsubscribe(id));
        events.publish(&[entry(1)]);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_publish_without_subscribers_still_tracks_seen() {
        let mut events = EntryListEvents::new();
        assert_eq!(events.publish(&[entry(1)]), 1);

        let (_, calls) = recorder(&mut events);
        events.publish(&[entry(1)]);
        assert!(calls.lock().unwrap().is_empty());
    }
}
