//! Topic registry: the mapping from topic name to its subscriber list.
//!
//! The registry is read-mostly. Publishing takes the read lock just long
//! enough to clone the handler records of one topic into work items;
//! registration, subscription, and unsubscription take the write lock.
//! Subscription IDs come from a single counter shared across topics, so
//! an ID never appears in more than one topic entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::events::stats::TopicStats;
use crate::events::types::{Invoker, SubscriptionId};

/// Reserved handler capacity for a freshly registered topic.
const TOPIC_HANDLER_RESERVE: usize = 3;

/// One subscription: the ID handed back to the caller plus the erased
/// invoker. Records are cloned into work items at publish time, so an
/// unsubscribed handler stays alive until its in-flight dispatches
/// finish.
#[derive(Clone)]
pub(crate) struct HandlerRecord {
    pub(crate) id: SubscriptionId,
    pub(crate) invoker: Arc<dyn Invoker>,
}

/// Subscriber list of one topic, in insertion order, plus its counters.
struct TopicEntry {
    handlers: Vec<HandlerRecord>,
    stats: Arc<TopicStats>,
}

impl TopicEntry {
    fn new() -> Self {
        TopicEntry {
            handlers: Vec::with_capacity(TOPIC_HANDLER_RESERVE),
            stats: Arc::new(TopicStats::default()),
        }
    }
}

pub(crate) struct Registry {
    topics: RwLock<HashMap<String, TopicEntry>>,
    next_id: AtomicU64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Registry {
            topics: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a topic. Idempotent: an existing entry, including its
    /// subscribers, is preserved.
    pub(crate) fn register(&self, topic: &str) -> Result<()> {
        if topic.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "topic",
                reason: "topic name must not be empty".into(),
            });
        }
        let mut topics = self.topics.write();
        if !topics.contains_key(topic) {
            topics.insert(topic.to_string(), TopicEntry::new());
            debug!(topic, "registered topic");
        }
        Ok(())
    }

    pub(crate) fn is_registered(&self, topic: &str) -> bool {
        self.topics.read().contains_key(topic)
    }

    /// Append a handler to a registered topic and issue its ID.
    pub(crate) fn subscribe(
        &self,
        topic: &str,
        invoker: Arc<dyn Invoker>,
    ) -> Result<SubscriptionId> {
        let mut topics = self.topics.write();
        let entry = topics.get_mut(topic).ok_or_else(|| Error::TopicUnknown {
            topic: topic.to_string(),
        })?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            topic,
            subscription = id,
            signature = invoker.args_type_name(),
            "subscribed handler"
        );
        entry.handlers.push(HandlerRecord { id, invoker });
        Ok(id)
    }

    /// Remove the handler with the given ID. Returns `true` iff a record
    /// was removed. Work items already enqueued for the removed handler
    /// still run.
    pub(crate) fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut topics = self.topics.write();
        let Some(entry) = topics.get_mut(topic) else {
            return false;
        };
        let before = entry.handlers.len();
        entry.handlers.retain(|record| record.id != id);
        let removed = entry.handlers.len() < before;
        if removed {
            debug!(topic, subscription = id, "unsubscribed handler");
        }
        removed
    }

    /// Clone the current handler records of a topic for fan-out, together
    /// with the topic's counters. `None` when the topic is unregistered.
    pub(crate) fn snapshot(&self, topic: &str) -> Option<(Vec<HandlerRecord>, Arc<TopicStats>)> {
        let topics = self.topics.read();
        let entry = topics.get(topic)?;
        Some((entry.handlers.clone(), Arc::clone(&entry.stats)))
    }

    /// Subscription count and counters of a topic.
    pub(crate) fn topic_view(&self, topic: &str) -> Option<(usize, Arc<TopicStats>)> {
        let topics = self.topics.read();
        let entry = topics.get(topic)?;
        Some((entry.handlers.len(), Arc::clone(&entry.stats)))
    }

    pub(crate) fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    pub(crate) fn total_subscriptions(&self) -> usize {
        self.topics
            .read()
            .values()
            .map(|entry| entry.handlers.len())
            .sum()
    }

    pub(crate) fn reset_topic_counters(&self) {
        for entry in self.topics.read().values() {
            entry.stats.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::IntoInvoker;

    fn noop_invoker() -> Arc<dyn Invoker> {
        (|| {}).into_invoker()
    }

    #[test]
    fn registration_is_idempotent() {
        let registry = Registry::new();
        registry.register("status").unwrap();
        let id = registry.subscribe("status", noop_invoker()).unwrap();
        registry.register("status").unwrap();

        assert_eq!(registry.topic_count(), 1);
        // Re-registration preserved the existing subscriber.
        assert!(registry.unsubscribe("status", id));
    }

    #[test]
    fn empty_topic_name_is_rejected() {
        let registry = Registry::new();
        assert!(matches!(
            registry.register(""),
            Err(Error::InvalidConfiguration { field: "topic", .. })
        ));
    }

    #[test]
    fn subscribe_requires_registration() {
        let registry = Registry::new();
        assert!(matches!(
            registry.subscribe("missing", noop_invoker()),
            Err(Error::TopicUnknown { .. })
        ));
    }

    #[test]
    fn ids_are_unique_and_strictly_increasing_across_topics() {
        let registry = Registry::new();
        registry.register("a").unwrap();
        registry.register("b").unwrap();

        let mut previous = 0;
        for topic in ["a", "b", "a", "b", "a"] {
            let id = registry.subscribe(topic, noop_invoker()).unwrap();
            assert!(id > previous);
            previous = id;
        }
        assert_eq!(registry.total_subscriptions(), 5);
    }

    #[test]
    fn zero_is_never_issued() {
        let registry = Registry::new();
        registry.register("t").unwrap();
        assert_eq!(registry.subscribe("t", noop_invoker()).unwrap(), 1);
    }

    #[test]
    fn unsubscribe_round_trip_restores_counts() {
        let registry = Registry::new();
        registry.register("t").unwrap();
        let keep = registry.subscribe("t", noop_invoker()).unwrap();
        let drop_me = registry.subscribe("t", noop_invoker()).unwrap();
        assert_eq!(registry.total_subscriptions(), 2);

        assert!(registry.unsubscribe("t", drop_me));
        assert_eq!(registry.total_subscriptions(), 1);

        // Unknown id and unknown topic both report "nothing removed".
        assert!(!registry.unsubscribe("t", drop_me));
        assert!(!registry.unsubscribe("t", 99_999));
        assert!(!registry.unsubscribe("missing", keep));
    }

    #[test]
    fn snapshot_preserves_insertion_order() {
        let registry = Registry::new();
        registry.register("t").unwrap();
        let first = registry.subscribe("t", noop_invoker()).unwrap();
        let second = registry.subscribe("t", noop_invoker()).unwrap();

        let (records, _) = registry.snapshot("t").unwrap();
        let ids: Vec<SubscriptionId> = records.iter().map(|record| record.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert!(registry.snapshot("missing").is_none());
    }
}
