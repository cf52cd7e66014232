//! Multi-thread behavior of multi-resource locks

use multilock_core::LockError;
use multilock_core::locking::{
    HashBacking, HashLockProvider, Interrupter, MultiReadWriteLock, ResourceStatus,
    SortedLockProvider, interrupt,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::{Duration, Instant};

type SharedLock = Arc<MultiReadWriteLock<&'static str, HashBacking>>;

fn shared_lock(
    provider: &HashLockProvider<&'static str>,
    resources: &[&'static str],
) -> SharedLock {
    Arc::new(provider.new_lock(resources.iter().copied()))
}

/// Block until `condition` holds or panic after a generous timeout
fn wait_for(condition: impl Fn() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < Duration::from_secs(10), "condition never became true");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_writers_are_mutually_exclusive() {
    let provider = HashLockProvider::new();
    let lock = shared_lock(&provider, &["x", "y"]);
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            thread::spawn(move || {
                for _ in 0..50 {
                    lock.write_lock().lock().unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::yield_now();
                    inside.fetch_sub(1, Ordering::SeqCst);
                    lock.write_lock().unlock().unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert!(provider.snapshot().is_idle());
}

#[test]
fn test_overlapping_sets_exclude_across_instances() {
    let provider = SortedLockProvider::new();
    let xy = Arc::new(provider.new_lock(["x", "y"]));
    let yz = Arc::new(provider.new_lock(["z", "y"]));
    let holding_y = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = [xy, yz]
        .into_iter()
        .map(|lock| {
            let holding_y = Arc::clone(&holding_y);
            let violations = Arc::clone(&violations);
            thread::spawn(move || {
                for _ in 0..200 {
                    lock.write_lock().lock().unwrap();
                    if holding_y.fetch_add(1, Ordering::SeqCst) != 0 {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    holding_y.fetch_sub(1, Ordering::SeqCst);
                    lock.write_lock().unlock().unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[test]
fn test_readers_and_writers_exclude() {
    let provider = HashLockProvider::new();
    let lock = shared_lock(&provider, &["x"]);
    let readers = Arc::new(AtomicUsize::new(0));
    let writers = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let lock = Arc::clone(&lock);
            let readers = Arc::clone(&readers);
            let writers = Arc::clone(&writers);
            let violations = Arc::clone(&violations);
            thread::spawn(move || {
                for _ in 0..100 {
                    if i % 3 == 0 {
                        let _guard = lock.write_lock().guard().unwrap();
                        writers.fetch_add(1, Ordering::SeqCst);
                        if readers.load(Ordering::SeqCst) != 0 {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        writers.fetch_sub(1, Ordering::SeqCst);
                    } else {
                        let _guard = lock.read_lock().guard().unwrap();
                        readers.fetch_add(1, Ordering::SeqCst);
                        if writers.load(Ordering::SeqCst) != 0 {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        readers.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert!(provider.snapshot().is_idle());
}

#[test]
fn test_many_readers_hold_together() {
    const READERS: usize = 5;
    let provider = HashLockProvider::new();
    let lock = shared_lock(&provider, &["x", "y"]);
    let all_holding = Arc::new(Barrier::new(READERS + 1));
    let release = Arc::new(Barrier::new(READERS + 1));

    let handles: Vec<_> = (0..READERS)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let all_holding = Arc::clone(&all_holding);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                lock.read_lock().lock().unwrap();
                all_holding.wait();
                release.wait();
                lock.read_lock().unlock().unwrap();
            })
        })
        .collect();

    all_holding.wait();
    assert_eq!(provider.status(&"x"), ResourceStatus::Shared { holders: READERS });
    assert_eq!(provider.snapshot().shared_holds, READERS * 2);
    release.wait();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(provider.is_shared_free(&["x", "y"]));
}

#[test]
fn test_second_writer_waits_for_first_unlock() {
    let provider = HashLockProvider::new();
    let lock = shared_lock(&provider, &["x", "y"]);
    let releasing = Arc::new(AtomicBool::new(false));

    lock.write_lock().lock().unwrap();

    let waiter = {
        let lock = Arc::clone(&lock);
        let releasing = Arc::clone(&releasing);
        thread::spawn(move || {
            lock.write_lock().lock().unwrap();
            let saw_release = releasing.load(Ordering::SeqCst);
            let held = lock.write_lock().is_held_by_current_thread();
            lock.write_lock().unlock().unwrap();
            (saw_release, held)
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!waiter.is_finished());

    releasing.store(true, Ordering::SeqCst);
    lock.write_lock().unlock().unwrap();

    let (saw_release, held) = waiter.join().unwrap();
    assert!(saw_release);
    assert!(held);
}

#[test]
fn test_try_write_fails_while_read_held() {
    let provider = HashLockProvider::new();
    let lock = shared_lock(&provider, &["x"]);
    let (to_writer, writer_rx) = mpsc::channel::<()>();
    let (to_main, main_rx) = mpsc::channel::<bool>();

    lock.read_lock().lock().unwrap();

    let writer = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            let start = Instant::now();
            let acquired = lock.write_lock().try_lock().unwrap();
            to_main.send(acquired).unwrap();
            assert!(start.elapsed() < Duration::from_secs(1));

            writer_rx.recv().unwrap();
            let acquired = lock.write_lock().try_lock().unwrap();
            if acquired {
                lock.write_lock().unlock().unwrap();
            }
            to_main.send(acquired).unwrap();
        })
    };

    assert!(!main_rx.recv().unwrap());
    assert!(provider.is_exclusive_free(&["x"]));

    lock.read_lock().unlock().unwrap();
    to_writer.send(()).unwrap();
    assert!(main_rx.recv().unwrap());
    writer.join().unwrap();
}

#[test]
fn test_timed_write_expires_against_held_read() {
    let provider = HashLockProvider::new();
    let lock = shared_lock(&provider, &["x"]);
    lock.read_lock().lock().unwrap();

    let writer = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            let start = Instant::now();
            let timeout = Duration::from_millis(100);
            let acquired = lock.write_lock().try_lock_for(timeout).unwrap();
            (acquired, start.elapsed(), lock.write_lock().is_held_by_current_thread())
        })
    };

    let (acquired, elapsed, held) = writer.join().unwrap();
    assert!(!acquired);
    assert!(!held);
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(5));

    assert!(provider.is_exclusive_free(&["x"]));
    assert_eq!(provider.status(&"x"), ResourceStatus::Shared { holders: 1 });
    lock.read_lock().unlock().unwrap();
}

#[test]
fn test_timed_read_expires_against_held_write() {
    let provider = HashLockProvider::new();
    let lock = shared_lock(&provider, &["x"]);
    lock.write_lock().lock().unwrap();

    let reader = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            let start = Instant::now();
            let acquired = lock.read_lock().try_lock_for(Duration::from_millis(80));
            (acquired, start.elapsed(), lock.read_lock().is_held_by_current_thread())
        })
    };

    let (acquired, elapsed, held) = reader.join().unwrap();
    assert_eq!(acquired, Ok(false));
    assert!(!held);
    assert!(elapsed >= Duration::from_millis(80));
    assert!(elapsed < Duration::from_secs(5));

    assert!(provider.is_shared_free(&["x"]));
    assert_eq!(
        provider.status(&"x"),
        ResourceStatus::Exclusive {
            held_by_current_thread: true
        }
    );
    lock.write_lock().unlock().unwrap();
    assert!(provider.snapshot().is_idle());
}

#[test]
fn test_timed_write_expires_against_held_write() {
    let provider = HashLockProvider::new();
    let holder = shared_lock(&provider, &["x", "y"]);
    let contender = shared_lock(&provider, &["y", "z"]);
    holder.write_lock().lock().unwrap();

    let writer = {
        let contender = Arc::clone(&contender);
        thread::spawn(move || {
            let start = Instant::now();
            let write = contender.write_lock();
            let acquired = write.try_lock_for(Duration::from_millis(80));
            (acquired, start.elapsed(), write.is_held_by_current_thread())
        })
    };

    let (acquired, elapsed, held) = writer.join().unwrap();
    assert_eq!(acquired, Ok(false));
    assert!(!held);
    assert!(elapsed >= Duration::from_millis(80));
    assert!(elapsed < Duration::from_secs(5));

    // Nothing of the failed claim is left, including the uncontended "z"
    assert!(provider.is_exclusive_free(&["z"]));
    assert_eq!(provider.snapshot().exclusive_resources, 2);
    holder.write_lock().unlock().unwrap();
    assert!(provider.snapshot().is_idle());
}

#[test]
fn test_timeout_budget_spans_both_write_phases() {
    const BUDGET: Duration = Duration::from_millis(400);
    const FIRST_WRITER_HOLDS: Duration = Duration::from_millis(300);

    let provider = HashLockProvider::new();
    let first_writer = shared_lock(&provider, &["x"]);
    let reader = shared_lock(&provider, &["y"]);
    let contender = shared_lock(&provider, &["x", "y"]);

    let (ready_tx, ready_rx) = mpsc::channel::<()>();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let writer_thread = {
        let lock = Arc::clone(&first_writer);
        let provider = provider.clone();
        let ready_tx = ready_tx.clone();
        thread::spawn(move || {
            lock.write_lock().lock().unwrap();
            ready_tx.send(()).unwrap();
            go_rx.recv().unwrap();
            thread::sleep(FIRST_WRITER_HOLDS);
            lock.write_lock().unlock().unwrap();
            // The contender moves on to draining the reader of "y"
            wait_for(|| matches!(provider.status(&"y"), ResourceStatus::Draining { .. }));
        })
    };

    let reader_thread = {
        let lock = Arc::clone(&reader);
        thread::spawn(move || {
            lock.read_lock().lock().unwrap();
            ready_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            lock.read_lock().unlock().unwrap();
        })
    };

    ready_rx.recv().unwrap();
    ready_rx.recv().unwrap();
    go_tx.send(()).unwrap();

    let start = Instant::now();
    let acquired = contender.write_lock().try_lock_for(BUDGET);
    let elapsed = start.elapsed();

    assert_eq!(acquired, Ok(false));
    assert!(elapsed >= BUDGET);
    // A budget restarted for the drain phase would run past 700ms
    assert!(elapsed < BUDGET + Duration::from_millis(250), "took {elapsed:?}");
    writer_thread.join().unwrap();

    assert!(provider.is_exclusive_free(&["x", "y"]));
    assert_eq!(provider.status(&"y"), ResourceStatus::Shared { holders: 1 });

    release_tx.send(()).unwrap();
    reader_thread.join().unwrap();
    assert!(provider.snapshot().is_idle());
}

#[test]
fn test_interrupted_drain_rolls_back() {
    let provider = HashLockProvider::new();
    let lock = shared_lock(&provider, &["x", "y"]);
    let (tx, rx) = mpsc::channel::<Interrupter>();

    lock.read_lock().lock().unwrap();

    let writer = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            tx.send(interrupt::current()).unwrap();
            lock.write_lock().lock_interruptibly()
        })
    };

    let interrupter = rx.recv().unwrap();
    // Wait until the writer has claimed ownership and is draining
    wait_for(|| matches!(provider.status(&"x"), ResourceStatus::Draining { .. }));
    interrupter.interrupt();

    assert_eq!(writer.join().unwrap(), Err(LockError::Interrupted));
    assert!(provider.is_exclusive_free(&["x", "y"]));
    assert_eq!(provider.status(&"y"), ResourceStatus::Shared { holders: 1 });
    lock.read_lock().unlock().unwrap();
    assert!(provider.snapshot().is_idle());
}

#[test]
fn test_interrupted_timed_wait_rolls_back() {
    let provider = HashLockProvider::new();
    let lock = shared_lock(&provider, &["x"]);
    let (tx, rx) = mpsc::channel::<Interrupter>();

    lock.read_lock().lock().unwrap();

    let writer = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            tx.send(interrupt::current()).unwrap();
            lock.write_lock().try_lock_for(Duration::from_secs(30))
        })
    };

    let interrupter = rx.recv().unwrap();
    wait_for(|| matches!(provider.status(&"x"), ResourceStatus::Draining { .. }));
    interrupter.interrupt();

    assert_eq!(writer.join().unwrap(), Err(LockError::Interrupted));
    assert!(provider.is_exclusive_free(&["x"]));
    lock.read_lock().unlock().unwrap();
}

#[test]
fn test_draining_writer_blocks_new_readers() {
    let provider = HashLockProvider::new();
    let first = shared_lock(&provider, &["x"]);
    let second = shared_lock(&provider, &["x"]);

    first.read_lock().lock().unwrap();

    let writer = {
        let first = Arc::clone(&first);
        thread::spawn(move || {
            first.write_lock().lock().unwrap();
            first.write_lock().unlock().unwrap();
        })
    };

    wait_for(|| matches!(provider.status(&"x"), ResourceStatus::Draining { .. }));

    let late_reader = {
        let second = Arc::clone(&second);
        thread::spawn(move || second.read_lock().try_lock())
    };
    assert_eq!(late_reader.join().unwrap(), Ok(false));

    first.read_lock().unlock().unwrap();
    writer.join().unwrap();
    assert!(provider.snapshot().is_idle());
}

#[test]
fn test_uninterruptible_wait_ignores_interrupt() {
    let provider = HashLockProvider::new();
    let lock = shared_lock(&provider, &["x"]);
    let (tx, rx) = mpsc::channel::<Interrupter>();

    lock.write_lock().lock().unwrap();

    let reader = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            tx.send(interrupt::current()).unwrap();
            lock.read_lock().lock().unwrap();
            lock.read_lock().unlock().unwrap();
            interrupt::interrupted()
        })
    };

    let interrupter = rx.recv().unwrap();
    interrupter.interrupt();
    thread::sleep(Duration::from_millis(50));
    assert!(!reader.is_finished());

    lock.write_lock().unlock().unwrap();
    // The interrupt is still pending once the reader gets through
    assert!(reader.join().unwrap());
}

#[test]
fn test_relock_from_holding_thread_fails_fast() {
    let provider = HashLockProvider::new();
    let lock = shared_lock(&provider, &["x"]);

    lock.write_lock().lock().unwrap();
    let start = Instant::now();
    assert!(lock.write_lock().lock().unwrap_err().is_usage_error());
    assert!(start.elapsed() < Duration::from_secs(1));

    // Another thread cannot release it either
    let other = Arc::clone(&lock);
    let result = thread::spawn(move || other.write_lock().unlock()).join().unwrap();
    assert!(matches!(result, Err(LockError::NotHeld(_))));

    lock.write_lock().unlock().unwrap();
}
