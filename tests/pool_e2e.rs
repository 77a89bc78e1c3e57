//! End-to-end pool scenarios.
//!
//! Covers the pool scheduler against its externally observable contract:
//!
//! - FIFO execution on a single-worker pool
//! - Cooperative cancellation of a running action
//! - Failure capture and surfacing through `wait`/`join`
//! - Shutdown with queued work: in-flight completes, un-started discards
//! - Thread bound under concurrent submission
//! - Full-idle observation via `wait_idle`

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use common::init_test_logging;
use uipool::{CancelToken, Deadline, Error, Event, PoolConfig, TaskState, ThreadPool};

fn pool(max_threads: usize, max_queue: usize) -> ThreadPool {
    ThreadPool::new(PoolConfig {
        max_threads,
        max_queue,
        idle_timeout: Duration::from_millis(200),
        ..PoolConfig::default()
    })
}

#[test]
fn three_tasks_run_in_submission_order() {
    init_test_logging();
    let pool = pool(1, 64);
    let order = Arc::new(Mutex::new(String::new()));

    let mut handles = Vec::new();
    for label in ["A", "B", "C"] {
        let order = Arc::clone(&order);
        handles.push(
            pool.submit(move || {
                order.lock().unwrap().push_str(label);
                Ok(())
            })
            .unwrap(),
        );
    }
    for handle in &handles {
        assert!(handle.wait(Deadline::from_millis(5_000)));
        assert_eq!(handle.state(), TaskState::Completed);
    }
    assert_eq!(*order.lock().unwrap(), "ABC");
}

#[test]
fn cancel_mid_flight_ends_the_busy_wait() {
    init_test_logging();
    let pool = pool(1, 16);
    let token = CancelToken::new();

    let handle = {
        let observed = token.clone();
        pool.submit_with_token(
            move || {
                while !observed.is_cancelled() {
                    thread::sleep(Duration::from_millis(1));
                }
                Ok(())
            },
            token.clone(),
        )
        .unwrap()
    };

    thread::sleep(Duration::from_millis(50));
    token.cancel();

    let start = Instant::now();
    assert!(handle.join(Deadline::from_millis(5_000)).unwrap());
    assert!(start.elapsed() < Duration::from_millis(1_000));
    assert_eq!(handle.state(), TaskState::Completed);
}

#[test]
fn failed_task_surfaces_its_message() {
    init_test_logging();
    let pool = pool(1, 16);
    let handle = pool.submit(|| Err(Error::app("boom"))).unwrap();

    assert!(handle.wait(Deadline::from_millis(5_000)));
    assert_eq!(handle.state(), TaskState::Failed);
    assert_eq!(handle.failure().as_deref(), Some("boom"));

    let err = handle.join(Deadline::from_millis(100)).unwrap_err();
    assert!(err.to_string().contains("boom"));
}

#[test]
fn abort_sentinel_completes_without_failure() {
    init_test_logging();
    let pool = pool(1, 16);
    let handle = pool.submit(|| Err(Error::Aborted)).unwrap();
    assert!(handle.join(Deadline::from_millis(5_000)).unwrap());
    assert_eq!(handle.state(), TaskState::Completed);
    assert!(handle.failure().is_none());
}

#[test]
fn panicking_task_fails_without_killing_the_worker() {
    init_test_logging();
    let pool = pool(1, 16);
    let bad = pool.submit(|| panic!("kaboom")).unwrap();
    assert!(bad.wait(Deadline::from_millis(5_000)));
    assert_eq!(bad.state(), TaskState::Failed);
    assert_eq!(bad.failure().as_deref(), Some("kaboom"));

    // The same worker keeps serving.
    let good = pool.submit(|| Ok(())).unwrap();
    assert!(good.wait(Deadline::from_millis(5_000)));
    assert_eq!(good.state(), TaskState::Completed);
}

#[test]
fn shutdown_completes_in_flight_and_discards_the_rest() {
    init_test_logging();
    let pool = pool(1, 100);
    let started = Arc::new(Event::new());
    let release = Arc::new(Event::new());

    let first = {
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        pool.submit(move || {
            started.set();
            release.wait(Deadline::from_millis(10_000));
            Ok(())
        })
        .unwrap()
    };
    let queued: Vec<_> = (0..99)
        .map(|_| pool.submit(|| Ok(())).unwrap())
        .collect();

    started.wait(Deadline::from_millis(5_000));
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        release.set();
    });
    drop(pool);
    releaser.join().unwrap();

    assert_eq!(first.state(), TaskState::Completed);
    for task in &queued {
        assert_eq!(task.state(), TaskState::Discarded);
        // Discarded tasks still complete their signal.
        assert!(task.wait(Deadline::from_millis(10)));
    }
}

#[test]
fn late_submission_is_born_discarded() {
    init_test_logging();
    let pool = pool(2, 16);
    pool.shutdown();

    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let task = pool
        .submit(move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    assert_eq!(task.state(), TaskState::Discarded);
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn worker_bound_holds_under_concurrent_submission() {
    init_test_logging();
    let pool = Arc::new(pool(3, 1024));
    let peak = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for _ in 0..50 {
                    pool.submit(|| {
                        thread::sleep(Duration::from_micros(200));
                        Ok(())
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    let sampler = {
        let pool = Arc::clone(&pool);
        let peak = Arc::clone(&peak);
        thread::spawn(move || {
            for _ in 0..200 {
                peak.fetch_max(pool.total_workers(), Ordering::Relaxed);
                thread::sleep(Duration::from_micros(500));
            }
        })
    };

    for submitter in submitters {
        submitter.join().unwrap();
    }
    sampler.join().unwrap();
    pool.wait_idle();

    assert!(peak.load(Ordering::Relaxed) <= 3);
    assert_eq!(pool.queued_len(), 0);
}

#[test]
fn wait_idle_blocks_until_the_queue_drains() {
    init_test_logging();
    let pool = pool(2, 256);
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..32 {
        let done = Arc::clone(&done);
        pool.submit(move || {
            thread::sleep(Duration::from_millis(2));
            done.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
    }
    pool.wait_idle();
    assert_eq!(done.load(Ordering::Relaxed), 32);
    assert_eq!(pool.queued_len(), 0);
}

#[test]
fn shared_token_cancels_many_tasks() {
    init_test_logging();
    let pool = pool(2, 64);
    let token = CancelToken::new();
    let aborted = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let observed = token.clone();
            let aborted = Arc::clone(&aborted);
            pool.submit_with_token(
                move || {
                    observed.wait_handle().wait(Deadline::from_millis(10_000));
                    aborted.fetch_add(1, Ordering::Relaxed);
                    Err(Error::Aborted)
                },
                token.clone(),
            )
            .unwrap()
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    token.cancel();
    for handle in handles {
        assert!(handle.join(Deadline::from_millis(5_000)).unwrap());
        assert_eq!(handle.state(), TaskState::Completed);
    }
    assert_eq!(aborted.load(Ordering::Relaxed), 6);
}
