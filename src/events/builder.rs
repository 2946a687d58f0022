//! Builder for configuring and starting an event bus.
//!
//! Wraps [`EventBusConfig`] in chained setters and carries the one option
//! that is not plain data: a custom scaling policy for the pool manager.

use std::sync::Arc;
use std::time::Duration;

use crate::errors::Result;
use crate::events::bus::{EventBus, EventBusConfig};
use crate::pool::{PoolSnapshot, ScaleDecision, ScalingPolicy, TaskModel, ThreadModel};

/// Builder for creating an initialized [`EventBus`].
///
/// ```no_run
/// use eventbus_core::{EventBus, TaskModel, ThreadModel};
///
/// # fn main() -> eventbus_core::Result<()> {
/// let bus = EventBus::builder()
///     .thread_model(ThreadModel::Dynamic)
///     .task_model(TaskModel::Normal)
///     .thread_min(4)
///     .thread_max(16)
///     .task_max(100_000)
///     .build()?;
/// # drop(bus);
/// # Ok(())
/// # }
/// ```
pub struct EventBusBuilder {
    config: EventBusConfig,
    scaling_policy: Option<ScalingPolicy>,
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        EventBusBuilder {
            config: EventBusConfig::default(),
            scaling_policy: None,
        }
    }
}

impl EventBusBuilder {
    /// Create a builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool sizing mode.
    pub fn thread_model(mut self, thread_model: ThreadModel) -> Self {
        self.config.thread_model = thread_model;
        self
    }

    /// Set the queue discipline.
    pub fn task_model(mut self, task_model: TaskModel) -> Self {
        self.config.task_model = task_model;
        self
    }

    /// Set the minimum (and initial) worker count.
    pub fn thread_min(mut self, thread_min: usize) -> Self {
        self.config.thread_min = thread_min;
        self
    }

    /// Set the maximum worker count.
    pub fn thread_max(mut self, thread_max: usize) -> Self {
        self.config.thread_max = thread_max;
        self
    }

    /// Set the task queue capacity.
    pub fn task_max(mut self, task_max: usize) -> Self {
        self.config.task_max = task_max;
        self
    }

    /// Set the cadence of the pool manager's scaling tick.
    pub fn manager_tick(mut self, manager_tick: Duration) -> Self {
        self.config.manager_tick = manager_tick;
        self
    }

    /// Replace the built-in scaling rule.
    ///
    /// The policy is evaluated once per manager tick; pool bounds are
    /// enforced after it runs.
    pub fn scaling_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&PoolSnapshot) -> ScaleDecision + Send + Sync + 'static,
    {
        self.scaling_policy = Some(Arc::new(policy));
        self
    }

    /// Validate the configuration and start the bus.
    pub fn build(self) -> Result<EventBus> {
        let bus = EventBus::new();
        bus.init_with_policy(self.config, self.scaling_policy)?;
        Ok(bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_produce_a_working_bus() {
        let bus = EventBusBuilder::new().build().unwrap();
        assert!(bus.is_initialized());
        bus.shutdown();
    }

    #[test]
    fn builder_settings_reach_the_pool() {
        let bus = EventBus::builder()
            .thread_model(ThreadModel::Fixed)
            .thread_min(3)
            .thread_max(3)
            .task_max(64)
            .build()
            .unwrap();
        assert_eq!(bus.status().thread_count, 3);
        bus.shutdown();
    }

    #[test]
    fn invalid_builder_settings_are_rejected() {
        assert!(EventBus::builder().thread_min(0).build().is_err());
        assert!(EventBus::builder()
            .thread_min(4)
            .thread_max(2)
            .build()
            .is_err());
    }

    #[test]
    fn custom_scaling_policy_is_accepted() {
        let bus = EventBus::builder()
            .thread_min(1)
            .thread_max(4)
            .manager_tick(Duration::from_millis(10))
            .scaling_policy(|_snapshot| ScaleDecision::Hold)
            .build()
            .unwrap();
        assert_eq!(bus.status().thread_count, 1);
        bus.shutdown();
    }
}
