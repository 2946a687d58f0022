//! Dynamic pool sizing.
//!
//! In [`ThreadModel::Dynamic`](crate::pool::ThreadModel) mode a dedicated
//! manager thread wakes on a fixed tick, takes a snapshot of the pool, and
//! applies a scaling policy. Growth reacts to observable backlog; shrink
//! uses the busy-worker ratio to avoid oscillation. At most one worker is
//! grown or retired per tick to damp feedback.
//!
//! The manager runs on its own thread rather than as a task on the pool:
//! a pool-hosted timer would be starved exactly when the pool is
//! saturated, which is when scaling must act.
//!
//! The rule is a customization point: pass a [`ScalingPolicy`] to
//! [`ThreadPool::new`](crate::pool::ThreadPool::new) to replace
//! [`default_scaling_policy`]. Bounds are enforced by the manager after
//! the policy runs, so a custom policy can never push the pool outside
//! `[thread_min, thread_max]`.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::pool::thread_pool::PoolShared;

/// Consistent view of the pool taken at the start of a manager tick.
#[derive(Debug, Clone, Copy)]
pub struct PoolSnapshot {
    /// Current backlog in the task queue
    pub queue_size: usize,
    /// Number of live worker threads
    pub worker_count: usize,
    /// Number of workers currently executing a task
    pub busy_count: usize,
    /// Shrink credits already granted but not yet consumed
    pub shrink_credits: usize,
    /// Lower bound of the pool population
    pub thread_min: usize,
    /// Upper bound of the pool population
    pub thread_max: usize,
}

/// What the scaling policy wants done this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Start one new worker
    Grow,
    /// Grant one shrink credit so an idle worker exits
    Shrink,
    /// Leave the pool as it is
    Hold,
}

/// User-replaceable scaling rule, evaluated once per manager tick.
pub type ScalingPolicy = Arc<dyn Fn(&PoolSnapshot) -> ScaleDecision + Send + Sync>;

/// The built-in scaling rule.
///
/// - **Grow** when the backlog exceeds the worker count and the pool is
///   below `thread_max`.
/// - **Shrink** when fewer than half the workers are busy and retiring one
///   more (on top of already-granted credits) stays above `thread_min`.
pub fn default_scaling_policy(snapshot: &PoolSnapshot) -> ScaleDecision {
    if snapshot.queue_size > snapshot.worker_count && snapshot.worker_count < snapshot.thread_max {
        return ScaleDecision::Grow;
    }
    if snapshot.busy_count * 2 < snapshot.worker_count
        && snapshot.worker_count.saturating_sub(snapshot.shrink_credits) > snapshot.thread_min
    {
        return ScaleDecision::Shrink;
    }
    ScaleDecision::Hold
}

/// Body of the manager thread.
///
/// Runs until the shutdown flag is set. Panics are caught by the spawner,
/// which poisons the pool.
pub(crate) fn run_manager(shared: Arc<PoolShared>) {
    debug!(tick = ?shared.config.manager_tick, "pool manager started");
    loop {
        {
            let mut gate = shared.manager_gate.lock();
            shared
                .manager_wake
                .wait_for(&mut gate, shared.config.manager_tick);
        }
        if shared.control.is_shutdown() {
            break;
        }

        shared.reap_finished_workers();
        let snapshot = shared.snapshot();

        match (shared.policy)(&snapshot) {
            ScaleDecision::Grow => {
                if snapshot.worker_count < snapshot.thread_max {
                    match shared.spawn_worker() {
                        Ok(id) => debug!(
                            worker = id,
                            workers = snapshot.worker_count + 1,
                            backlog = snapshot.queue_size,
                            "pool grew by one worker"
                        ),
                        Err(e) => warn!(error = %e, "failed to grow pool"),
                    }
                }
            }
            ScaleDecision::Shrink => {
                if shared
                    .queue
                    .grant_shrink(&shared.control, snapshot.thread_min)
                {
                    debug!(
                        workers = snapshot.worker_count,
                        busy = snapshot.busy_count,
                        "granted one shrink credit"
                    );
                }
            }
            ScaleDecision::Hold => {}
        }
    }
    debug!("pool manager exiting");
}
