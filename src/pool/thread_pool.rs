//! The worker pool itself: thread lifecycle, submission, and shutdown.
//!
//! Workers are OS threads draining the pool's task queue. Dynamic workers
//! can exit voluntarily (shrink credits) without anyone joining them
//! synchronously: exited handles stay on a join list that the manager
//! reaps on its tick and `shutdown` drains at the end.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::errors::{Error, Result};
use crate::pool::manager::{self, default_scaling_policy, PoolSnapshot, ScalingPolicy};
use crate::pool::queue::{Fetched, Task, TaskQueue};
use crate::pool::{PoolConfig, PoolControl, TaskModel, TaskPriority, ThreadModel};

/// A live or recently exited worker thread awaiting join.
struct WorkerHandle {
    id: usize,
    handle: JoinHandle<()>,
}

/// State shared between the pool handle, its workers, and the manager.
pub(crate) struct PoolShared {
    pub(crate) config: PoolConfig,
    pub(crate) queue: TaskQueue,
    pub(crate) control: PoolControl,
    pub(crate) policy: ScalingPolicy,
    /// Join list; exited dynamic workers are reaped on the manager tick.
    workers: Mutex<Vec<WorkerHandle>>,
    next_worker_id: AtomicUsize,
    /// Gate the manager sleeps on so shutdown can interrupt a tick.
    pub(crate) manager_gate: Mutex<()>,
    pub(crate) manager_wake: Condvar,
}

impl PoolShared {
    /// Consistent view of the pool counters for a scaling decision.
    pub(crate) fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            queue_size: self.queue.len(),
            worker_count: self.control.workers_live.load(Ordering::Acquire),
            busy_count: self.control.busy.load(Ordering::Acquire),
            shrink_credits: self.control.shrink_credits.load(Ordering::Acquire),
            thread_min: self.config.thread_min,
            thread_max: self.config.effective_max(),
        }
    }

    /// Start one worker thread and register it on the join list.
    pub(crate) fn spawn_worker(self: &Arc<Self>) -> Result<usize> {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        // Registered before the thread starts so the live count never
        // observes a worker exit it has not observed starting.
        self.control.workers_live.fetch_add(1, Ordering::AcqRel);
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("bus-worker-{id}"))
            .spawn(move || worker_loop(shared, id));
        match spawned {
            Ok(handle) => {
                self.workers.lock().push(WorkerHandle { id, handle });
                Ok(id)
            }
            Err(e) => {
                self.control.workers_live.fetch_sub(1, Ordering::AcqRel);
                Err(Error::Internal {
                    message: format!("failed to spawn worker thread: {e}"),
                })
            }
        }
    }

    /// Join workers that have already exited (voluntary retirement).
    pub(crate) fn reap_finished_workers(&self) {
        let mut workers = self.workers.lock();
        let mut index = 0;
        while index < workers.len() {
            if workers[index].handle.is_finished() {
                let worker = workers.swap_remove(index);
                let _ = worker.handle.join();
                debug!(worker = worker.id, "reaped retired worker");
            } else {
                index += 1;
            }
        }
    }
}

/// Body of every worker thread.
fn worker_loop(shared: Arc<PoolShared>, id: usize) {
    debug!(worker = id, "worker started");
    loop {
        match shared.queue.pop_blocking(&shared.control) {
            Fetched::Task(task) => {
                shared.control.busy.fetch_add(1, Ordering::AcqRel);
                let outcome = catch_unwind(AssertUnwindSafe(task));
                shared.control.busy.fetch_sub(1, Ordering::AcqRel);
                if outcome.is_err() {
                    // Dispatch jobs from the bus catch and count their own
                    // panics; this is the backstop for raw submissions.
                    warn!(worker = id, "task panicked, worker continues");
                }
            }
            Fetched::Retire => {
                // The live count was already decremented under the queue
                // lock when the credit was claimed.
                debug!(worker = id, "worker retiring on shrink credit");
                return;
            }
            Fetched::Shutdown => {
                shared.control.workers_live.fetch_sub(1, Ordering::AcqRel);
                debug!(worker = id, "worker exiting on shutdown");
                return;
            }
        }
    }
}

/// A pool of worker threads draining a bounded task queue.
///
/// Construction starts exactly `thread_min` workers; in
/// [`ThreadModel::Dynamic`] mode a manager thread then scales the pool
/// between `thread_min` and `thread_max`. Dropping the pool shuts it
/// down.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    manager: Mutex<Option<JoinHandle<()>>>,
    /// Serializes concurrent shutdown calls so every caller returns only
    /// once the pool is fully terminated.
    shutdown_gate: Mutex<()>,
}

impl ThreadPool {
    /// Create a pool with the built-in scaling rule.
    pub fn new(config: PoolConfig) -> Result<Self> {
        Self::with_policy(config, Arc::new(default_scaling_policy))
    }

    /// Create a pool with a caller-supplied scaling rule.
    ///
    /// The policy is consulted once per manager tick; pool bounds are
    /// enforced after it runs, so it cannot push the population outside
    /// `[thread_min, thread_max]`.
    pub fn with_policy(config: PoolConfig, policy: ScalingPolicy) -> Result<Self> {
        config.validate()?;

        let queue = match config.task_model {
            TaskModel::Normal => TaskQueue::fifo(config.task_max),
            TaskModel::Priority => TaskQueue::priority(config.task_max),
        };

        let shared = Arc::new(PoolShared {
            config,
            queue,
            control: PoolControl::default(),
            policy,
            workers: Mutex::new(Vec::new()),
            next_worker_id: AtomicUsize::new(0),
            manager_gate: Mutex::new(()),
            manager_wake: Condvar::new(),
        });

        for _ in 0..shared.config.thread_min {
            if let Err(e) = shared.spawn_worker() {
                Self::abort_startup(&shared);
                return Err(e);
            }
        }

        let manager = if shared.config.thread_model == ThreadModel::Dynamic {
            let manager_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new().name("bus-manager".into()).spawn(move || {
                let loop_shared = Arc::clone(&manager_shared);
                if catch_unwind(AssertUnwindSafe(|| manager::run_manager(loop_shared))).is_err() {
                    manager_shared.control.poisoned.store(true, Ordering::Release);
                    error!("pool manager panicked, pool is poisoned");
                }
            });
            match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    Self::abort_startup(&shared);
                    return Err(Error::Internal {
                        message: format!("failed to spawn manager thread: {e}"),
                    });
                }
            }
        } else {
            None
        };

        debug!(
            workers = shared.config.thread_min,
            model = ?shared.config.thread_model,
            discipline = ?shared.config.task_model,
            capacity = shared.config.task_max,
            "thread pool started"
        );

        Ok(ThreadPool {
            shared,
            manager: Mutex::new(manager),
            shutdown_gate: Mutex::new(()),
        })
    }

    /// Tear down workers started before a construction failure.
    fn abort_startup(shared: &Arc<PoolShared>) {
        shared.control.shutdown.store(true, Ordering::Release);
        shared.queue.notify_all();
        let workers: Vec<WorkerHandle> = shared.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.handle.join();
        }
    }

    fn check_accepting(&self) -> Result<()> {
        if self.shared.control.is_shutdown() {
            return Err(Error::PoolShutdown);
        }
        if self.shared.control.is_poisoned() {
            return Err(Error::PoolPoisoned);
        }
        Ok(())
    }

    /// Enqueue a task on a [`TaskModel::Normal`](crate::pool::TaskModel)
    /// pool. Fails fast when the queue is at capacity.
    pub fn submit(&self, task: Task) -> Result<()> {
        self.check_accepting()?;
        self.shared.queue.push(task)
    }

    /// Enqueue a task with a priority class on a
    /// [`TaskModel::Priority`](crate::pool::TaskModel) pool.
    pub fn submit_with_priority(&self, priority: TaskPriority, task: Task) -> Result<()> {
        self.check_accepting()?;
        self.shared.queue.push_with_priority(priority, task)
    }

    /// Current number of live worker threads.
    pub fn thread_count(&self) -> usize {
        self.shared.control.workers_live.load(Ordering::Acquire)
    }

    /// Number of workers currently executing a task.
    pub fn busy_count(&self) -> usize {
        self.shared.control.busy.load(Ordering::Acquire)
    }

    /// Workers not currently executing a task.
    pub fn idle_thread_count(&self) -> usize {
        self.thread_count().saturating_sub(self.busy_count())
    }

    /// Current backlog in the task queue.
    pub fn queue_size(&self) -> usize {
        self.shared.queue.len()
    }

    /// Configured queue capacity.
    pub fn queue_capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// The pool's immutable configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Whether the manager has failed fatally.
    pub fn is_poisoned(&self) -> bool {
        self.shared.control.is_poisoned()
    }

    /// Stop accepting work, drain the already-accepted backlog, and join
    /// every worker and the manager. Idempotent; concurrent callers all
    /// return once the pool is fully terminated.
    pub fn shutdown(&self) {
        let _gate = self.shutdown_gate.lock();
        self.shared.control.shutdown.store(true, Ordering::Release);
        self.shared.queue.notify_all();
        self.shared.manager_wake.notify_all();

        if let Some(handle) = self.manager.lock().take() {
            let _ = handle.join();
        }
        let workers: Vec<WorkerHandle> = self.shared.workers.lock().drain(..).collect();
        if !workers.is_empty() {
            debug!(workers = workers.len(), "joining pool workers");
        }
        for worker in workers {
            let _ = worker.handle.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
