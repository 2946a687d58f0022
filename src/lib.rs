/*!
# eventbus-core

An in-process event bus: named topics, typed handlers, asynchronous
fan-out on a managed worker pool.

- Topic registry with type-safe subscribe and signature-preserving publish
- Dynamic, auto-scaling worker pool with FIFO and priority queue
  disciplines
- Handler failure isolation: panics and signature mismatches are counted
  and logged, never propagated
- Read-only statistics surface for monitoring
- Logging and configuration conventions shared by the whole stack

Publishers never block on handler execution: `publish` packs the argument
tuple once, enqueues one work item per subscriber, and returns. The only
backpressure is the bounded task queue, reported synchronously as
[`Error::QueueFull`].
*/

// Set mimalloc as the global allocator for better memory performance
// Only when this crate is used as a binary, not as a library dependency
#[cfg(not(feature = "no-global-allocator"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod errors;
pub mod events;
pub mod logging;
pub mod pool;

/// Re-export commonly used types
pub use errors::{Error, Result};
pub use events::builder::EventBusBuilder;
pub use events::bus::{EventBus, EventBusConfig};
pub use events::stats::{BusStatus, SimplifiedStatus, TopicStatus};
pub use events::types::{
    ArgPack, EventArgs, IntoInvoker, Invoker, SignatureMismatch, SubscriptionId,
};
pub use logging::setup::{setup_logging, LoggingConfig};
pub use pool::{
    default_scaling_policy, PoolConfig, PoolSnapshot, ScaleDecision, ScalingPolicy, TaskModel,
    TaskPriority, ThreadModel, ThreadPool,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn it_works() {
        // Basic test to verify crate builds
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn fresh_bus_reports_empty_status() {
        let bus = EventBus::new();
        let status = bus.status();
        assert!(!status.is_initialized);
        assert_eq!(status.registered_events_count, 0);
        assert_eq!(status.thread_count, 0);
    }

    #[test]
    fn end_to_end_publish_through_public_api() {
        let bus = EventBus::builder()
            .thread_model(ThreadModel::Fixed)
            .thread_min(2)
            .thread_max(2)
            .task_max(128)
            .build()
            .unwrap();

        let counter = Arc::new(AtomicU64::new(0));
        let counter_clone = Arc::clone(&counter);
        bus.subscribe_safe("lifecycle.started", move |component: &String| {
            assert_eq!(component, "api");
            counter_clone.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        bus.publish("lifecycle.started", ("api".to_string(),)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while counter.load(Ordering::Relaxed) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        bus.shutdown();
    }
}
