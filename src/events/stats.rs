//! Read-only statistics for the bus and its topics.
//!
//! Counters are updated from worker threads on every dispatch and read
//! from any thread; they are plain atomics with relaxed ordering, so a
//! snapshot is approximate under concurrent load but exact once the bus
//! is quiescent. The pool gauges (`thread_count`, `queue_size`,
//! `idle_thread_count`) are instantaneous observations and are not
//! resettable.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Dispatch counters kept at bus level.
#[derive(Debug, Default)]
pub(crate) struct BusStats {
    triggered: AtomicU64,
    failed: AtomicU64,
}

impl BusStats {
    pub(crate) fn record_triggered(&self) {
        self.triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn triggered(&self) -> u64 {
        self.triggered.load(Ordering::Relaxed)
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.triggered.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }
}

/// Dispatch counters kept per topic.
#[derive(Debug, Default)]
pub(crate) struct TopicStats {
    triggered: AtomicU64,
    failed: AtomicU64,
}

impl TopicStats {
    pub(crate) fn record_triggered(&self) {
        self.triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn triggered(&self) -> u64 {
        self.triggered.load(Ordering::Relaxed)
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.triggered.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }
}

/// Full status snapshot of the bus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusStatus {
    /// Whether the bus is currently in the Initialized state
    pub is_initialized: bool,
    /// Number of registered topics
    pub registered_events_count: usize,
    /// Sum of subscription counts across all topics
    pub total_subscriptions: usize,
    /// Successful handler invocations since init or last reset
    pub events_triggered_count: u64,
    /// Handler invocations that panicked or were rejected by signature
    pub events_failed_count: u64,
    /// Current number of live worker threads
    pub thread_count: usize,
    /// Current task queue backlog
    pub queue_size: usize,
    /// Workers not currently executing a task
    pub idle_thread_count: usize,
}

/// Condensed status for cheap periodic polling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimplifiedStatus {
    /// Successful handler invocations
    pub events_triggered: u64,
    /// Failed handler invocations
    pub events_failed: u64,
    /// Current number of live worker threads
    pub thread_count: usize,
    /// Current task queue backlog
    pub queue_size: usize,
}

/// Per-topic statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopicStatus {
    /// Number of live subscriptions on the topic
    pub subscription_count: usize,
    /// Successful handler invocations for this topic
    pub triggered_count: u64,
    /// Failed handler invocations for this topic
    pub failed_count: u64,
}

impl TopicStatus {
    /// Fraction of invocations that succeeded, `1.0` when none occurred.
    pub fn success_rate(&self) -> f64 {
        let total = self.triggered_count + self.failed_count;
        if total == 0 {
            1.0
        } else {
            self.triggered_count as f64 / total as f64
        }
    }
}
