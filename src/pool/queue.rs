//! Bounded multi-producer multi-consumer task queues.
//!
//! Two disciplines share one surface: a plain FIFO queue, and a priority
//! queue ordered by `(priority class, insertion sequence)` so that higher
//! classes preempt lower ones while insertion order is preserved within a
//! class.
//!
//! Producers never block: a queue at capacity reports
//! [`Error::QueueFull`] immediately. Consumers block on a condition
//! variable until a task arrives, a shrink credit is claimable, or
//! shutdown is observed with an empty queue (remaining tasks are drained
//! before workers exit).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::errors::{Error, Result};
use crate::pool::{PoolControl, TaskPriority};

/// A zero-argument work item executed by a pool worker.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Outcome of a blocking dequeue.
pub(crate) enum Fetched {
    /// A task was dequeued
    Task(Task),
    /// The worker claimed a shrink credit while idle and must exit
    Retire,
    /// Shutdown was observed with an empty queue
    Shutdown,
}

/// A task together with its priority-queue ordering key.
struct QueuedTask {
    class: u8,
    seq: u64,
    task: Task,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.class, self.seq).cmp(&(other.class, other.seq))
    }
}

enum QueueState {
    Fifo(VecDeque<Task>),
    Priority {
        heap: BinaryHeap<Reverse<QueuedTask>>,
        next_seq: u64,
    },
}

impl QueueState {
    fn pop(&mut self) -> Option<Task> {
        match self {
            QueueState::Fifo(tasks) => tasks.pop_front(),
            QueueState::Priority { heap, .. } => heap.pop().map(|Reverse(entry)| entry.task),
        }
    }
}

/// Bounded task queue owned by a worker pool.
///
/// The queue owns its own mutex and condition variable; the shared
/// [`PoolControl`] is consulted inside the wait loop so shutdown and
/// shrink signals can wake blocked consumers.
pub(crate) struct TaskQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: usize,
    // Mirrors the queue length for lock-free observation.
    len: AtomicUsize,
}

impl TaskQueue {
    /// Create a FIFO queue with the given capacity.
    pub(crate) fn fifo(capacity: usize) -> Self {
        TaskQueue {
            state: Mutex::new(QueueState::Fifo(VecDeque::new())),
            available: Condvar::new(),
            capacity,
            len: AtomicUsize::new(0),
        }
    }

    /// Create a priority queue with the given capacity.
    pub(crate) fn priority(capacity: usize) -> Self {
        TaskQueue {
            state: Mutex::new(QueueState::Priority {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            available: Condvar::new(),
            capacity,
            len: AtomicUsize::new(0),
        }
    }

    /// Enqueue a task on a FIFO queue. Never blocks; a full queue is
    /// reported immediately.
    pub(crate) fn push(&self, task: Task) -> Result<()> {
        let mut state = self.state.lock();
        let tasks = match &mut *state {
            QueueState::Fifo(tasks) => tasks,
            QueueState::Priority { .. } => {
                return Err(Error::TaskModelMismatch {
                    reason: "plain submission on a priority pool",
                });
            }
        };
        if tasks.len() >= self.capacity {
            return Err(Error::QueueFull { capacity: self.capacity });
        }
        tasks.push_back(task);
        self.len.fetch_add(1, Ordering::Relaxed);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Enqueue a task with a priority class on a priority queue.
    pub(crate) fn push_with_priority(&self, priority: TaskPriority, task: Task) -> Result<()> {
        let mut state = self.state.lock();
        let (heap, next_seq) = match &mut *state {
            QueueState::Priority { heap, next_seq } => (heap, next_seq),
            QueueState::Fifo(_) => {
                return Err(Error::TaskModelMismatch {
                    reason: "priority submission on a FIFO pool",
                });
            }
        };
        if heap.len() >= self.capacity {
            return Err(Error::QueueFull { capacity: self.capacity });
        }
        let seq = *next_seq;
        *next_seq += 1;
        heap.push(Reverse(QueuedTask {
            class: priority.class(),
            seq,
            task,
        }));
        self.len.fetch_add(1, Ordering::Relaxed);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Block until a task is available, a shrink credit is claimable, or
    /// shutdown is observed with an empty queue.
    ///
    /// Remaining tasks are always handed out before `Shutdown` is
    /// reported, so a shutdown drains the backlog that was accepted before
    /// it began.
    ///
    /// A claimed shrink credit also removes the worker from the live
    /// count while the queue lock is still held; together with
    /// [`grant_shrink`](Self::grant_shrink) taking the same lock, the
    /// manager can never observe a retired worker as live and over-grant
    /// credits past `thread_min`.
    pub(crate) fn pop_blocking(&self, control: &PoolControl) -> Fetched {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.pop() {
                self.len.fetch_sub(1, Ordering::Relaxed);
                return Fetched::Task(task);
            }
            if control.is_shutdown() {
                return Fetched::Shutdown;
            }
            if control.try_claim_shrink_credit() {
                control.workers_live.fetch_sub(1, Ordering::AcqRel);
                return Fetched::Retire;
            }
            self.available.wait(&mut state);
        }
    }

    /// Grant one shrink credit and wake an idle consumer, unless doing so
    /// could take the pool below `thread_min`.
    ///
    /// The guard runs under the queue lock, mutually exclusive with the
    /// claim in [`pop_blocking`](Self::pop_blocking), so the live count it
    /// reads is exact with respect to retiring workers.
    pub(crate) fn grant_shrink(&self, control: &PoolControl, thread_min: usize) -> bool {
        let _state = self.state.lock();
        let live = control.workers_live.load(Ordering::Acquire);
        let credits = control.shrink_credits.load(Ordering::Acquire);
        if live.saturating_sub(credits) <= thread_min {
            return false;
        }
        control.shrink_credits.fetch_add(1, Ordering::AcqRel);
        self.available.notify_one();
        true
    }

    /// Current number of queued tasks.
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Configured capacity.
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wake a single blocked consumer. Used when a shrink credit is
    /// granted.
    pub(crate) fn notify_one(&self) {
        self.available.notify_one();
    }

    /// Wake every blocked consumer. Used at shutdown.
    pub(crate) fn notify_all(&self) {
        self.available.notify_all();
    }
}
