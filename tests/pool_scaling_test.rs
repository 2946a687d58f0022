//! Dynamic pool sizing properties, exercised through the raw pool API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use eventbus_core::{Error, PoolConfig, TaskModel, ThreadModel, ThreadPool};

fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn dynamic_config(min: usize, max: usize) -> PoolConfig {
    PoolConfig {
        thread_model: ThreadModel::Dynamic,
        task_model: TaskModel::Normal,
        thread_min: min,
        thread_max: max,
        task_max: 10_000,
        manager_tick: Duration::from_millis(10),
    }
}

#[test]
fn every_valid_configuration_starts_at_thread_min() {
    for (min, max) in [(1, 1), (1, 4), (2, 2), (3, 7), (8, 8)] {
        let pool = ThreadPool::new(dynamic_config(min, max)).unwrap();
        assert_eq!(pool.thread_count(), min, "min={min} max={max}");
        pool.shutdown();
    }
}

#[test]
fn sustained_backlog_grows_the_pool_to_thread_max_and_not_beyond() {
    let pool = ThreadPool::new(dynamic_config(1, 4)).unwrap();
    let release = Arc::new(AtomicBool::new(false));

    // Enough parked tasks to keep queue_size above worker_count while the
    // manager reacts.
    for _ in 0..64 {
        let release = Arc::clone(&release);
        pool.submit(Box::new(move || {
            while !release.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(1));
            }
        }))
        .unwrap();
    }

    assert!(wait_until(Duration::from_secs(10), || pool.thread_count() == 4));

    // Saturation persists; the population must hold at the upper bound.
    for _ in 0..20 {
        assert!(pool.thread_count() <= 4);
        thread::sleep(Duration::from_millis(10));
    }

    release.store(true, Ordering::Release);
    pool.shutdown();
}

#[test]
fn idle_pool_converges_back_to_thread_min() {
    let pool = ThreadPool::new(dynamic_config(1, 4)).unwrap();
    let release = Arc::new(AtomicBool::new(false));

    for _ in 0..64 {
        let release = Arc::clone(&release);
        pool.submit(Box::new(move || {
            while !release.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(1));
            }
        }))
        .unwrap();
    }
    assert!(wait_until(Duration::from_secs(10), || pool.thread_count() == 4));

    // Drain the backlog, then idle workers retire one tick at a time.
    release.store(true, Ordering::Release);
    assert!(wait_until(Duration::from_secs(10), || pool.thread_count() == 1));

    // The floor holds once reached.
    for _ in 0..20 {
        assert!(pool.thread_count() >= 1);
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(pool.thread_count(), 1);
    pool.shutdown();
}

#[test]
fn fixed_pool_never_resizes() {
    let pool = ThreadPool::new(PoolConfig {
        thread_model: ThreadModel::Fixed,
        thread_min: 2,
        thread_max: 2,
        task_max: 1_000,
        manager_tick: Duration::from_millis(10),
        ..Default::default()
    })
    .unwrap();

    let release = Arc::new(AtomicBool::new(false));
    for _ in 0..32 {
        let release = Arc::clone(&release);
        pool.submit(Box::new(move || {
            while !release.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(1));
            }
        }))
        .unwrap();
    }

    thread::sleep(Duration::from_millis(200));
    assert_eq!(pool.thread_count(), 2);

    release.store(true, Ordering::Release);
    pool.shutdown();
    assert_eq!(pool.thread_count(), 0);
}

#[test]
fn shutdown_drains_accepted_work_then_rejects_submissions() {
    let pool = ThreadPool::new(dynamic_config(2, 4)).unwrap();
    let done = Arc::new(AtomicBool::new(false));
    let done_clone = Arc::clone(&done);
    pool.submit(Box::new(move || {
        done_clone.store(true, Ordering::Release);
    }))
    .unwrap();

    pool.shutdown();
    assert!(done.load(Ordering::Acquire));
    assert!(matches!(
        pool.submit(Box::new(|| {})),
        Err(Error::PoolShutdown)
    ));

    // A second shutdown changes nothing.
    pool.shutdown();
    assert_eq!(pool.thread_count(), 0);
}

#[test]
fn busy_and_idle_counts_track_execution() {
    let pool = ThreadPool::new(dynamic_config(2, 2)).unwrap();
    let release = Arc::new(AtomicBool::new(false));
    let release_clone = Arc::clone(&release);
    pool.submit(Box::new(move || {
        while !release_clone.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }
    }))
    .unwrap();

    assert!(wait_until(Duration::from_secs(5), || pool.busy_count() == 1));
    assert_eq!(pool.idle_thread_count(), pool.thread_count() - 1);

    release.store(true, Ordering::Release);
    assert!(wait_until(Duration::from_secs(5), || pool.busy_count() == 0));
    pool.shutdown();
}
