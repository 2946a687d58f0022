//! # Worker Pool
//!
//! A pool of OS worker threads draining a bounded task queue, with an
//! optional manager thread that resizes the worker population at runtime.
//!
//! The pool is the execution half of the event bus: the dispatcher hands it
//! opaque zero-argument work items, and the pool owns concurrency,
//! lifecycle, backpressure, and scaling. It is usable on its own as a
//! general-purpose thread pool.
//!
//! ## Key characteristics
//!
//! - **Two queue disciplines**: plain FIFO, or a three-class priority queue
//!   with strict FIFO within a class (see [`TaskModel`]).
//! - **Two sizing modes**: pinned to `thread_min`, or scaled between
//!   `thread_min` and `thread_max` by a manager thread (see
//!   [`ThreadModel`]).
//! - **Fail-fast backpressure**: submission never blocks on capacity; a
//!   full queue is reported to the caller immediately.
//! - **Panic isolation**: a panicking work item is caught at the worker
//!   boundary and never terminates the worker.
//!
//! The scaling rule is a customization point: supply your own
//! [`ScalingPolicy`](manager::ScalingPolicy) to replace the default
//! backlog/busy-ratio heuristic.

pub mod manager;
pub mod queue;
pub mod thread_pool;

pub use manager::{default_scaling_policy, PoolSnapshot, ScaleDecision, ScalingPolicy};
pub use queue::Task;
pub use thread_pool::ThreadPool;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Default cadence of the manager thread's scaling tick.
pub const DEFAULT_MANAGER_TICK: Duration = Duration::from_millis(100);

/// Default task queue capacity.
pub const DEFAULT_TASK_MAX: usize = 1024;

/// How the pool's thread population is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadModel {
    /// Pool size pinned to `thread_min`; no manager thread runs.
    Fixed,
    /// A manager thread scales the pool between `thread_min` and
    /// `thread_max` based on backlog and busy-worker ratio.
    Dynamic,
}

/// Which queue discipline the pool uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskModel {
    /// Single FIFO queue; priority submission is rejected.
    Normal,
    /// Priority queue ordered by `(priority class, insertion sequence)`;
    /// plain submission is rejected.
    Priority,
}

/// Priority class of a task on a [`TaskModel::Priority`] pool.
///
/// Lower class values dequeue first; within a class tasks dequeue in
/// insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskPriority {
    /// Dispatched before everything else
    High,
    /// Dispatched after all queued high-priority tasks
    Middle,
    /// Dispatched only when no higher class is queued
    Low,
}

impl TaskPriority {
    /// Numeric ordering key of the class (`High = 0`).
    pub(crate) fn class(self) -> u8 {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Middle => 1,
            TaskPriority::Low => 2,
        }
    }
}

/// Immutable pool configuration.
///
/// Validated once at pool construction; bounds cannot be changed after
/// start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Sizing mode of the pool
    pub thread_model: ThreadModel,
    /// Queue discipline of the pool
    pub task_model: TaskModel,
    /// Minimum (and initial) number of worker threads, `>= 1`
    pub thread_min: usize,
    /// Maximum number of worker threads, `>= thread_min`
    pub thread_max: usize,
    /// Task queue capacity, `>= 1`
    pub task_max: usize,
    /// Cadence of the manager's scaling tick (cadence only, not a
    /// correctness property)
    #[serde(default = "default_manager_tick")]
    pub manager_tick: Duration,
}

fn default_manager_tick() -> Duration {
    DEFAULT_MANAGER_TICK
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            thread_model: ThreadModel::Dynamic,
            task_model: TaskModel::Normal,
            thread_min: 2,
            thread_max: 8,
            task_max: DEFAULT_TASK_MAX,
            manager_tick: DEFAULT_MANAGER_TICK,
        }
    }
}

impl PoolConfig {
    /// Check the configuration invariants.
    pub fn validate(&self) -> Result<()> {
        if self.thread_min < 1 {
            return Err(Error::InvalidConfiguration {
                field: "thread_min",
                reason: format!("must be >= 1, got {}", self.thread_min),
            });
        }
        if self.thread_min > self.thread_max {
            return Err(Error::InvalidConfiguration {
                field: "thread_max",
                reason: format!(
                    "thread_min ({}) cannot be greater than thread_max ({})",
                    self.thread_min, self.thread_max
                ),
            });
        }
        if self.task_max < 1 {
            return Err(Error::InvalidConfiguration {
                field: "task_max",
                reason: format!("must be >= 1, got {}", self.task_max),
            });
        }
        Ok(())
    }

    /// Effective maximum pool size: in [`ThreadModel::Fixed`] mode the pool
    /// never grows past `thread_min`.
    pub(crate) fn effective_max(&self) -> usize {
        match self.thread_model {
            ThreadModel::Fixed => self.thread_min,
            ThreadModel::Dynamic => self.thread_max,
        }
    }
}

/// Shared pool runtime state observed by workers, the manager, and
/// submitters.
#[derive(Debug, Default)]
pub(crate) struct PoolControl {
    /// Set once at shutdown; never cleared
    pub shutdown: AtomicBool,
    /// Set when the manager thread fails fatally
    pub poisoned: AtomicBool,
    /// Number of workers currently executing a task
    pub busy: AtomicUsize,
    /// Outstanding one-shot tokens authorizing an idle worker to exit
    pub shrink_credits: AtomicUsize,
    /// Number of live worker threads
    pub workers_live: AtomicUsize,
}

impl PoolControl {
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Atomically consume one shrink credit if any is outstanding.
    pub(crate) fn try_claim_shrink_credit(&self) -> bool {
        self.shrink_credits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |credits| {
                credits.checked_sub(1)
            })
            .is_ok()
    }
}
