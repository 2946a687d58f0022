//! The event bus: topic registry plus signature-preserving dispatch onto
//! the worker pool.
//!
//! ## Key characteristics
//!
//! - **Per-subscriber fan-out**: one publish to a topic with N subscribers
//!   enqueues N work items; the argument tuple is packed once and shared
//!   by all of them.
//! - **Asynchronous delivery**: `publish` returns as soon as the work
//!   items are enqueued; it never waits for handlers.
//! - **Failure isolation**: a handler that panics, or whose signature
//!   rejects the published arguments, is counted and logged but never
//!   affects the publisher or the other subscribers of the same publish.
//! - **Explicit lifecycle**: Uninitialized → Initialized → ShuttingDown →
//!   Terminated. Re-initialization is rejected.
//!
//! ## Delivery ordering
//!
//! Within one publish, work items are enqueued in the topic's insertion
//! order; handlers observe that order only on a FIFO bus with a single
//! worker. Across publishes there is no global order, and on a priority
//! bus higher classes from later publishes overtake queued lower classes.
//!
//! A subscriber removed after its work item was enqueued still runs:
//! unsubscribe races are resolved on the enqueue side.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::events::builder::EventBusBuilder;
use crate::events::registry::{HandlerRecord, Registry};
use crate::events::stats::{BusStats, BusStatus, SimplifiedStatus, TopicStats, TopicStatus};
use crate::events::types::{ArgPack, EventArgs, IntoInvoker, Invoker, SubscriptionId};
use crate::pool::{
    PoolConfig, ScalingPolicy, Task, TaskModel, TaskPriority, ThreadPool, ThreadModel,
    DEFAULT_MANAGER_TICK, DEFAULT_TASK_MAX,
};

/// Immutable bus configuration, validated at [`EventBus::init`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Sizing mode of the worker pool
    pub thread_model: ThreadModel,
    /// Queue discipline of the worker pool
    pub task_model: TaskModel,
    /// Minimum (and initial) number of worker threads, `>= 1`
    pub thread_min: usize,
    /// Maximum number of worker threads, `>= thread_min`
    pub thread_max: usize,
    /// Task queue capacity, `>= 1`
    pub task_max: usize,
    /// Cadence of the pool manager's scaling tick
    #[serde(default = "default_manager_tick")]
    pub manager_tick: Duration,
}

fn default_manager_tick() -> Duration {
    DEFAULT_MANAGER_TICK
}

impl Default for EventBusConfig {
    fn default() -> Self {
        EventBusConfig {
            thread_model: ThreadModel::Dynamic,
            task_model: TaskModel::Normal,
            thread_min: 2,
            thread_max: 8,
            task_max: DEFAULT_TASK_MAX,
            manager_tick: DEFAULT_MANAGER_TICK,
        }
    }
}

impl EventBusConfig {
    /// Check the configuration invariants.
    pub fn validate(&self) -> Result<()> {
        self.pool_config().validate()
    }

    pub(crate) fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            thread_model: self.thread_model,
            task_model: self.task_model,
            thread_min: self.thread_min,
            thread_max: self.thread_max,
            task_max: self.task_max,
            manager_tick: self.manager_tick,
        }
    }
}

/// Bus lifecycle. Transitions are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Initialized,
    ShuttingDown,
    Terminated,
}

/// Everything that exists only between `init` and teardown.
struct BusCore {
    config: EventBusConfig,
    pool: ThreadPool,
    registry: Registry,
    stats: Arc<BusStats>,
}

struct BusInner {
    state: Lifecycle,
    core: Option<Arc<BusCore>>,
}

/// In-process publish/subscribe event bus backed by a worker pool.
///
/// ```no_run
/// use eventbus_core::{EventBus, EventBusConfig};
///
/// # fn main() -> eventbus_core::Result<()> {
/// let bus = EventBus::with_config(EventBusConfig::default())?;
/// bus.register_topic("door.opened")?;
///
/// bus.subscribe("door.opened", |door_id: &u32, badge: &String| {
///     println!("door {door_id} opened by {badge}");
/// })?;
///
/// bus.publish("door.opened", (12u32, "badge-774".to_string()))?;
/// bus.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct EventBus {
    inner: RwLock<BusInner>,
}

impl EventBus {
    /// Create an uninitialized bus. Every operation except `init` and the
    /// observation surface fails with [`Error::NotInitialized`] until
    /// [`init`](Self::init) succeeds.
    pub fn new() -> Self {
        EventBus {
            inner: RwLock::new(BusInner {
                state: Lifecycle::Uninitialized,
                core: None,
            }),
        }
    }

    /// Create and initialize a bus in one step.
    pub fn with_config(config: EventBusConfig) -> Result<Self> {
        let bus = Self::new();
        bus.init(config)?;
        Ok(bus)
    }

    /// Start configuring a bus with the builder.
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    /// Initialize the bus: validate the configuration and start the worker
    /// pool (and, in dynamic mode, its manager).
    ///
    /// One-shot: a second `init` fails with [`Error::AlreadyInitialized`];
    /// after shutdown it fails with [`Error::PoolShutdown`].
    pub fn init(&self, config: EventBusConfig) -> Result<()> {
        self.init_with_policy(config, None)
    }

    pub(crate) fn init_with_policy(
        &self,
        config: EventBusConfig,
        policy: Option<ScalingPolicy>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.state {
            Lifecycle::Uninitialized => {}
            Lifecycle::Initialized => return Err(Error::AlreadyInitialized),
            Lifecycle::ShuttingDown | Lifecycle::Terminated => return Err(Error::PoolShutdown),
        }

        let pool_config = config.pool_config();
        let pool = match policy {
            Some(policy) => ThreadPool::with_policy(pool_config, policy)?,
            None => ThreadPool::new(pool_config)?,
        };

        debug!(
            thread_model = ?config.thread_model,
            task_model = ?config.task_model,
            thread_min = config.thread_min,
            thread_max = config.thread_max,
            task_max = config.task_max,
            "event bus initialized"
        );

        inner.core = Some(Arc::new(BusCore {
            config,
            pool,
            registry: Registry::new(),
            stats: Arc::new(BusStats::default()),
        }));
        inner.state = Lifecycle::Initialized;
        Ok(())
    }

    /// Whether the bus is currently in the Initialized state.
    pub fn is_initialized(&self) -> bool {
        self.inner.read().state == Lifecycle::Initialized
    }

    fn core(&self) -> Result<Arc<BusCore>> {
        let inner = self.inner.read();
        match inner.state {
            Lifecycle::Uninitialized => Err(Error::NotInitialized),
            Lifecycle::ShuttingDown | Lifecycle::Terminated => Err(Error::PoolShutdown),
            Lifecycle::Initialized => inner.core.clone().ok_or(Error::NotInitialized),
        }
    }

    /// Register a topic. Idempotent: re-registering preserves existing
    /// subscribers.
    pub fn register_topic(&self, topic: &str) -> Result<()> {
        self.core()?.registry.register(topic)
    }

    /// Whether a topic is registered. Usable in any lifecycle state.
    pub fn is_registered(&self, topic: &str) -> bool {
        let inner = self.inner.read();
        inner
            .core
            .as_ref()
            .map(|core| core.registry.is_registered(topic))
            .unwrap_or(false)
    }

    /// Subscribe a handler to a registered topic.
    ///
    /// The handler is any `Fn` over up to eight reference arguments (or
    /// none); its argument signature is recorded and checked against each
    /// published tuple at dispatch time. Fails with
    /// [`Error::TopicUnknown`] when the topic has not been registered.
    pub fn subscribe<A, F>(&self, topic: &str, handler: F) -> Result<SubscriptionId>
    where
        A: EventArgs,
        F: IntoInvoker<A>,
    {
        self.subscribe_invoker(topic, handler.into_invoker())
    }

    /// Subscribe to a topic, registering it first if absent.
    pub fn subscribe_safe<A, F>(&self, topic: &str, handler: F) -> Result<SubscriptionId>
    where
        A: EventArgs,
        F: IntoInvoker<A>,
    {
        let core = self.core()?;
        core.registry.register(topic)?;
        core.registry.subscribe(topic, handler.into_invoker())
    }

    /// Subscribe a pre-built erased invoker. This is the escape hatch for
    /// handlers that cannot be expressed as a plain `Fn`, such as custom
    /// [`Invoker`] implementations.
    pub fn subscribe_invoker(
        &self,
        topic: &str,
        invoker: Arc<dyn Invoker>,
    ) -> Result<SubscriptionId> {
        self.core()?.registry.subscribe(topic, invoker)
    }

    /// Publish an event on a FIFO bus.
    ///
    /// `args` is the packed argument tuple: `(value,)` for one argument,
    /// `()` for none. The tuple is packed once and shared read-only by
    /// every fan-out task. Returns once all work items are enqueued;
    /// handler completion is not awaited.
    pub fn publish<A: EventArgs>(&self, topic: &str, args: A) -> Result<()> {
        self.dispatch(topic, None, ArgPack::pack(args))
    }

    /// Publish an event with a priority class on a priority bus.
    pub fn publish_with_priority<A: EventArgs>(
        &self,
        priority: TaskPriority,
        topic: &str,
        args: A,
    ) -> Result<()> {
        self.dispatch(topic, Some(priority), ArgPack::pack(args))
    }

    fn dispatch(
        &self,
        topic: &str,
        priority: Option<TaskPriority>,
        args: Arc<ArgPack>,
    ) -> Result<()> {
        let core = self.core()?;
        match (core.config.task_model, priority) {
            (TaskModel::Normal, Some(_)) => {
                return Err(Error::TaskModelMismatch {
                    reason: "priority publish on a NORMAL bus",
                });
            }
            (TaskModel::Priority, None) => {
                return Err(Error::TaskModelMismatch {
                    reason: "plain publish on a PRIORITY bus",
                });
            }
            _ => {}
        }

        let (records, topic_stats) =
            core.registry
                .snapshot(topic)
                .ok_or_else(|| Error::TopicUnknown {
                    topic: topic.to_string(),
                })?;
        debug!(topic, fanout = records.len(), args = args.type_name(), "publishing event");

        let topic_label: Arc<str> = Arc::from(topic);
        for record in records {
            let job = dispatch_job(
                record,
                Arc::clone(&args),
                Arc::clone(&topic_label),
                Arc::clone(&core.stats),
                Arc::clone(&topic_stats),
            );
            match priority {
                None => core.pool.submit(job)?,
                Some(priority) => core.pool.submit_with_priority(priority, job)?,
            }
        }
        Ok(())
    }

    /// Remove a subscription. Returns `true` iff a record was removed;
    /// unknown IDs and unknown topics return `false`.
    ///
    /// Work items already enqueued for the removed handler still run.
    /// Once shutdown has begun this is silently a no-op returning `false`.
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        self.core()
            .map(|core| core.registry.unsubscribe(topic, id))
            .unwrap_or(false)
    }

    /// Tear the bus down: stop accepting work, drain the accepted backlog,
    /// join every worker and the manager. Idempotent.
    pub fn shutdown(&self) {
        let core = {
            let mut inner = self.inner.write();
            match inner.state {
                Lifecycle::Uninitialized => {
                    inner.state = Lifecycle::Terminated;
                    return;
                }
                Lifecycle::Terminated => return,
                Lifecycle::Initialized | Lifecycle::ShuttingDown => {
                    inner.state = Lifecycle::ShuttingDown;
                    inner.core.clone()
                }
            }
        };
        if let Some(core) = core {
            core.pool.shutdown();
        }
        self.inner.write().state = Lifecycle::Terminated;
        debug!("event bus terminated");
    }

    /// Full status snapshot.
    pub fn status(&self) -> BusStatus {
        let inner = self.inner.read();
        let is_initialized = inner.state == Lifecycle::Initialized;
        match &inner.core {
            Some(core) => BusStatus {
                is_initialized,
                registered_events_count: core.registry.topic_count(),
                total_subscriptions: core.registry.total_subscriptions(),
                events_triggered_count: core.stats.triggered(),
                events_failed_count: core.stats.failed(),
                thread_count: core.pool.thread_count(),
                queue_size: core.pool.queue_size(),
                idle_thread_count: core.pool.idle_thread_count(),
            },
            None => BusStatus::default(),
        }
    }

    /// Condensed status snapshot for cheap periodic polling.
    pub fn simplified_status(&self) -> SimplifiedStatus {
        let inner = self.inner.read();
        match &inner.core {
            Some(core) => SimplifiedStatus {
                events_triggered: core.stats.triggered(),
                events_failed: core.stats.failed(),
                thread_count: core.pool.thread_count(),
                queue_size: core.pool.queue_size(),
            },
            None => SimplifiedStatus::default(),
        }
    }

    /// Statistics of one topic, `None` when unregistered (or before
    /// init).
    pub fn topic_status(&self, topic: &str) -> Option<TopicStatus> {
        let inner = self.inner.read();
        let core = inner.core.as_ref()?;
        let (subscription_count, stats) = core.registry.topic_view(topic)?;
        Some(TopicStatus {
            subscription_count,
            triggered_count: stats.triggered(),
            failed_count: stats.failed(),
        })
    }

    /// Zero the dispatch counters at bus level and/or per topic. Pool
    /// gauges are instantaneous and unaffected.
    pub fn reset_statistics(&self, bus_counters: bool, topic_counters: bool) {
        let inner = self.inner.read();
        if let Some(core) = &inner.core {
            if bus_counters {
                core.stats.reset();
            }
            if topic_counters {
                core.registry.reset_topic_counters();
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Build the zero-argument work item for one subscriber of one publish.
///
/// The job owns everything it needs: the handler record, the shared
/// argument pack, the topic name for diagnostics, and the counters it
/// must update. Panics and signature rejections are absorbed here so the
/// worker only ever sees a completed job.
fn dispatch_job(
    record: HandlerRecord,
    args: Arc<ArgPack>,
    topic: Arc<str>,
    bus_stats: Arc<BusStats>,
    topic_stats: Arc<TopicStats>,
) -> Task {
    Box::new(move || {
        let outcome = catch_unwind(AssertUnwindSafe(|| record.invoker.invoke(&args)));
        match outcome {
            Ok(Ok(())) => {
                bus_stats.record_triggered();
                topic_stats.record_triggered();
            }
            Ok(Err(mismatch)) => {
                warn!(
                    topic = %topic,
                    subscription = record.id,
                    expected = mismatch.expected,
                    received = mismatch.received,
                    "handler signature rejected published arguments"
                );
                bus_stats.record_failed();
                topic_stats.record_failed();
            }
            Err(_) => {
                warn!(
                    topic = %topic,
                    subscription = record.id,
                    "handler panicked during dispatch"
                );
                bus_stats.record_failed();
                topic_stats.record_failed();
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Instant;

    fn fixed_bus() -> EventBus {
        EventBus::with_config(EventBusConfig {
            thread_model: ThreadModel::Fixed,
            thread_min: 1,
            thread_max: 1,
            task_max: 256,
            ..Default::default()
        })
        .unwrap()
    }

    fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn operations_before_init_are_rejected() {
        let bus = EventBus::new();
        assert!(!bus.is_initialized());
        assert_eq!(bus.register_topic("t"), Err(Error::NotInitialized));
        assert_eq!(bus.publish("t", ()), Err(Error::NotInitialized));
        assert_eq!(
            bus.subscribe("t", || {}).unwrap_err(),
            Error::NotInitialized
        );
        assert!(!bus.unsubscribe("t", 1));
    }

    #[test]
    fn reinitialization_is_rejected() {
        let bus = fixed_bus();
        assert_eq!(
            bus.init(EventBusConfig::default()),
            Err(Error::AlreadyInitialized)
        );
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let result = EventBus::with_config(EventBusConfig {
            thread_min: 0,
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(Error::InvalidConfiguration { field: "thread_min", .. })
        ));
    }

    #[test]
    fn publish_fans_out_to_every_subscriber() {
        let bus = fixed_bus();
        bus.register_topic("tick").unwrap();

        let counter = Arc::new(AtomicU64::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            bus.subscribe("tick", move |step: &u64| {
                counter.fetch_add(*step, Ordering::Relaxed);
            })
            .unwrap();
        }

        bus.publish("tick", (5u64,)).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            counter.load(Ordering::Relaxed) == 15
        }));
        assert_eq!(bus.status().events_triggered_count, 3);
        assert_eq!(bus.status().events_failed_count, 0);
    }

    #[test]
    fn publish_to_unregistered_topic_fails() {
        let bus = fixed_bus();
        assert_eq!(
            bus.publish("missing", ()),
            Err(Error::TopicUnknown { topic: "missing".into() })
        );
    }

    #[test]
    fn subscribe_safe_registers_on_demand() {
        let bus = fixed_bus();
        assert!(!bus.is_registered("auto"));
        let id = bus.subscribe_safe("auto", || {}).unwrap();
        assert!(bus.is_registered("auto"));
        assert!(id > 0);
    }

    #[test]
    fn signature_mismatch_counts_as_failure_and_spares_other_subscribers() {
        let bus = fixed_bus();
        bus.register_topic("measurement").unwrap();

        let matched = Arc::new(AtomicU64::new(0));
        let matched_clone = Arc::clone(&matched);
        bus.subscribe("measurement", move |_v: &String| {
            matched_clone.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        bus.subscribe("measurement", |_v: &u64| {}).unwrap();

        bus.publish("measurement", ("reading".to_string(),)).unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            bus.status().events_triggered_count == 1 && bus.status().events_failed_count == 1
        }));
        assert_eq!(matched.load(Ordering::Relaxed), 1);

        let topic = bus.topic_status("measurement").unwrap();
        assert_eq!(topic.subscription_count, 2);
        assert_eq!(topic.triggered_count, 1);
        assert_eq!(topic.failed_count, 1);
        assert_eq!(topic.success_rate(), 0.5);
    }

    #[test]
    fn zero_argument_handlers_receive_any_publish() {
        let bus = fixed_bus();
        bus.register_topic("anything").unwrap();

        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = Arc::clone(&calls);
        bus.subscribe("anything", move || {
            calls_clone.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        bus.publish("anything", ()).unwrap();
        bus.publish("anything", (42u64, true)).unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            calls.load(Ordering::Relaxed) == 2
        }));
        assert_eq!(bus.status().events_failed_count, 0);
    }

    #[test]
    fn handler_panic_is_isolated_and_counted() {
        let bus = fixed_bus();
        bus.register_topic("risky").unwrap();

        let survivor = Arc::new(AtomicU64::new(0));
        bus.subscribe("risky", |_: &u32| panic!("handler bug")).unwrap();
        let survivor_clone = Arc::clone(&survivor);
        bus.subscribe("risky", move |_: &u32| {
            survivor_clone.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        bus.publish("risky", (1u32,)).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            survivor.load(Ordering::Relaxed) == 1 && bus.status().events_failed_count == 1
        }));

        // The bus stays usable after the panic.
        bus.publish("risky", (2u32,)).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            survivor.load(Ordering::Relaxed) == 2
        }));
    }

    #[test]
    fn removed_subscriber_is_not_invoked_by_later_publishes() {
        let bus = fixed_bus();
        bus.register_topic("t").unwrap();

        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = Arc::clone(&calls);
        let id = bus
            .subscribe("t", move || {
                calls_clone.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();

        bus.publish("t", ()).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            calls.load(Ordering::Relaxed) == 1
        }));

        assert!(bus.unsubscribe("t", id));
        bus.publish("t", ()).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn discipline_mismatch_is_reported_before_fanout() {
        let fifo = fixed_bus();
        fifo.register_topic("t").unwrap();
        assert!(matches!(
            fifo.publish_with_priority(TaskPriority::High, "t", ()),
            Err(Error::TaskModelMismatch { .. })
        ));

        let priority = EventBus::with_config(EventBusConfig {
            thread_model: ThreadModel::Fixed,
            task_model: TaskModel::Priority,
            thread_min: 1,
            thread_max: 1,
            task_max: 64,
            ..Default::default()
        })
        .unwrap();
        priority.register_topic("t").unwrap();
        assert!(matches!(
            priority.publish("t", ()),
            Err(Error::TaskModelMismatch { .. })
        ));
    }

    #[test]
    fn shutdown_is_idempotent_and_rejects_publishes() {
        let bus = fixed_bus();
        bus.register_topic("t").unwrap();
        bus.shutdown();
        bus.shutdown();
        assert!(!bus.is_initialized());
        assert_eq!(bus.publish("t", ()), Err(Error::PoolShutdown));
        assert_eq!(bus.register_topic("u"), Err(Error::PoolShutdown));
    }

    #[test]
    fn statistics_reset_zeroes_the_requested_counters() {
        let bus = fixed_bus();
        bus.register_topic("t").unwrap();
        bus.subscribe("t", || {}).unwrap();
        bus.publish("t", ()).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            bus.status().events_triggered_count == 1
        }));

        bus.reset_statistics(true, false);
        assert_eq!(bus.status().events_triggered_count, 0);
        assert_eq!(bus.topic_status("t").unwrap().triggered_count, 1);

        bus.reset_statistics(false, true);
        assert_eq!(bus.topic_status("t").unwrap().triggered_count, 0);
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = EventBusConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EventBusConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.thread_min, config.thread_min);
        assert_eq!(back.task_model, config.task_model);
        assert_eq!(back.manager_tick, config.manager_tick);
    }
}
