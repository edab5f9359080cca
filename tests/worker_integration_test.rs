/*!
 * Worker Lifecycle Integration Tests
 * End-to-end worker/deque handoff, terminal-state consistency, and
 * process-global subscriber fan-out
 */

use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sync_core::waitable::Waitable;
use sync_core::worker::{subscribe_global, WorkerHandle, WorkerFailure};
use sync_core::{BlockingDeque, Payload, Runnable, Timeout, WorkerState, WorkerThread};

/// Pushes 0..5 into a shared deque with a short pause between items.
struct SlowProducer {
    deque: Arc<BlockingDeque<u32>>,
}

impl Runnable for SlowProducer {
    fn run(&self, _worker: &WorkerHandle, _input: Option<Payload>) -> Result<Option<Payload>, WorkerFailure> {
        for i in 0..5u32 {
            self.deque
                .push_back(i, Timeout::from_millis(1_000), None)
                .map_err(|e| WorkerFailure::new(e.to_string()))?;
            thread::sleep(Duration::from_millis(10));
        }
        Ok(None)
    }

    fn stop_notify(&self, _worker: &WorkerHandle) {}
}

#[test]
fn test_worker_feeds_deque_consumer_in_order() {
    let deque = Arc::new(BlockingDeque::new());
    let worker = WorkerThread::new(SlowProducer {
        deque: Arc::clone(&deque),
    });
    worker.start(None).unwrap();

    let mut received = Vec::new();
    for _ in 0..5 {
        received.push(deque.pop_front(Timeout::FOREVER, None).unwrap());
    }
    assert_eq!(received, vec![0, 1, 2, 3, 4]);

    let status = worker.wait_for(Timeout::from_millis(2_000)).unwrap();
    assert!(status.is_signaled());
    assert_eq!(worker.state(), WorkerState::Terminated);
    assert!(worker.take_fatal_failure().unwrap().is_none());
}

#[test]
fn test_terminal_state_is_consistent_across_observers() {
    struct Quick;
    impl Runnable for Quick {
        fn run(&self, _worker: &WorkerHandle, _input: Option<Payload>) -> Result<Option<Payload>, WorkerFailure> {
            Ok(Some(Box::new("done".to_string())))
        }
        fn stop_notify(&self, _worker: &WorkerHandle) {}
    }

    let worker = Arc::new(WorkerThread::new(Quick));
    worker.start(None).unwrap();

    // Several observers wait independently; all must agree on the terminal
    // picture once any of them wakes.
    let mut observers = Vec::new();
    for _ in 0..4 {
        let worker = Arc::clone(&worker);
        observers.push(thread::spawn(move || {
            let status = worker.wait_for(Timeout::from_millis(2_000)).unwrap();
            (status.is_signaled(), worker.state())
        }));
    }
    for observer in observers {
        let (signaled, state) = observer.join().unwrap();
        assert!(signaled);
        assert_eq!(state, WorkerState::Terminated);
    }

    let data = worker.return_data().unwrap().unwrap();
    assert_eq!(*data.downcast::<String>().unwrap(), "done");
    // Collected exactly once.
    assert!(worker.return_data().unwrap().is_none());
}

#[test]
fn test_detached_worker_runs_to_completion() {
    let deque = Arc::new(BlockingDeque::new());
    let id = WorkerThread::spawn_detached(
        SlowProducer {
            deque: Arc::clone(&deque),
        },
        None,
    )
    .unwrap();
    assert!(id > 0);

    // No handle survives; the only observable effect is the work itself.
    let mut received = Vec::new();
    for _ in 0..5 {
        received.push(deque.pop_front(Timeout::from_millis(2_000), None).unwrap());
    }
    assert_eq!(received, vec![0, 1, 2, 3, 4]);
}

#[test]
#[serial]
fn test_global_subscribers_see_every_worker() {
    struct Noop;
    impl Runnable for Noop {
        fn run(&self, _worker: &WorkerHandle, _input: Option<Payload>) -> Result<Option<Payload>, WorkerFailure> {
            Ok(None)
        }
        fn stop_notify(&self, _worker: &WorkerHandle) {}
    }

    let terminations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&terminations);
    let subscription = subscribe_global(
        WorkerState::Terminated,
        Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let workers: Vec<_> = (0..3).map(|_| WorkerThread::new(Noop)).collect();
    for worker in &workers {
        worker.start(None).unwrap();
    }
    for worker in &workers {
        worker.wait_for(Timeout::from_millis(2_000)).unwrap();
    }
    assert_eq!(terminations.load(Ordering::SeqCst), 3);

    // After unsubscribing, further workers go unnoticed.
    drop(subscription);
    let late = WorkerThread::new(Noop);
    late.start(None).unwrap();
    late.wait_for(Timeout::from_millis(2_000)).unwrap();
    assert_eq!(terminations.load(Ordering::SeqCst), 3);
}
