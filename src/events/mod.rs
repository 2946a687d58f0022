//! # Event System
//!
//! Publish/subscribe dispatch over named topics, backed by the worker
//! pool in [`crate::pool`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use eventbus_core::{EventBus, TaskModel, ThreadModel};
//!
//! fn main() -> eventbus_core::Result<()> {
//!     // 1. Configure and start the bus
//!     let bus = EventBus::builder()
//!         .thread_model(ThreadModel::Dynamic)
//!         .task_model(TaskModel::Normal)
//!         .thread_min(2)
//!         .thread_max(8)
//!         .task_max(10_000)
//!         .build()?;
//!
//!     // 2. Register a topic and subscribe typed handlers
//!     bus.register_topic("sensor.reading")?;
//!     bus.subscribe("sensor.reading", |sensor: &String, value: &f64| {
//!         println!("{sensor}: {value}");
//!     })?;
//!
//!     // 3. Publish: the argument tuple is packed once and fanned out to
//!     //    every subscriber on the worker pool
//!     bus.publish("sensor.reading", ("thermo-1".to_string(), 21.5f64))?;
//!
//!     // 4. Observe and shut down
//!     println!("{:?}", bus.simplified_status());
//!     bus.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! Handlers run on pool workers, never on the publishing thread. A
//! handler that panics or whose signature rejects the published tuple is
//! counted in the statistics and logged; it never affects the publisher
//! or the topic's other subscribers.

pub mod builder;
pub mod bus;
pub mod registry;
pub mod stats;
pub mod types;

pub use builder::EventBusBuilder;
pub use bus::{EventBus, EventBusConfig};
pub use stats::{BusStatus, SimplifiedStatus, TopicStatus};
pub use types::{ArgPack, EventArgs, IntoInvoker, Invoker, SignatureMismatch, SubscriptionId};
