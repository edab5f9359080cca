/*!
 * Counting Semaphore
 *
 * Bounded non-negative count. `signal(n)` atomically raises the count and
 * reports the previous value; a successful wait consumes one unit.
 */

use super::traits::{WaitError, WaitResult, WaitStatus, Waitable};
use crate::core::{TimeBudget, Timeout};
use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct SemState {
    count: usize,
    waiters: usize,
}

/// Bounded counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<SemState>,
    condvar: Condvar,
    max: usize,
}

impl Semaphore {
    /// `initial` is clamped to `max`.
    pub fn new(initial: usize, max: usize) -> Self {
        Self {
            state: Mutex::new(SemState {
                count: initial.min(max),
                waiters: 0,
            }),
            condvar: Condvar::new(),
            max,
        }
    }

    /// Raise the count by `n`, waking up to `n` waiters.
    ///
    /// Returns the count as it was before the call. Overflowing `max` is an
    /// error and leaves the count untouched.
    pub fn signal(&self, n: usize) -> WaitResult<usize> {
        let mut state = self.state.lock();
        // checked_add: a huge `n` must report overflow, not wrap or panic.
        let raised = match state.count.checked_add(n) {
            Some(raised) if raised <= self.max => raised,
            _ => {
                return Err(WaitError::SemaphoreOverflow {
                    current: state.count,
                    requested: n,
                    max: self.max,
                })
            }
        };
        let previous = state.count;
        state.count = raised;
        for _ in 0..n.min(state.waiters) {
            self.condvar.notify_one();
        }
        Ok(previous)
    }

    /// Current count snapshot.
    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

impl Waitable for Semaphore {
    fn wait_for(&self, timeout: Timeout) -> WaitResult<WaitStatus> {
        let budget = TimeBudget::start(timeout);
        let mut state = self.state.lock();

        loop {
            if state.count > 0 {
                state.count -= 1;
                return Ok(WaitStatus::Signaled);
            }
            if budget.expired() {
                return Ok(WaitStatus::TimedOut);
            }

            state.waiters += 1;
            match budget.remaining() {
                Timeout::Forever => {
                    self.condvar.wait(&mut state);
                }
                Timeout::After(d) => {
                    self.condvar.wait_for(&mut state, d);
                }
            }
            state.waiters -= 1;
        }
    }

    fn ready_hint(&self) -> bool {
        self.count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_signal_returns_previous_count() {
        let sem = Semaphore::new(1, 10);
        assert_eq!(sem.signal(3).unwrap(), 1);
        assert_eq!(sem.count(), 4);
    }

    #[test]
    fn test_wait_decrements() {
        let sem = Semaphore::new(2, 10);
        assert!(sem.wait_for(Timeout::ZERO).unwrap().is_signaled());
        assert!(sem.wait_for(Timeout::ZERO).unwrap().is_signaled());
        assert!(sem.wait_for(Timeout::ZERO).unwrap().is_timed_out());
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn test_overflow_rejected() {
        let sem = Semaphore::new(3, 4);
        let err = sem.signal(2).unwrap_err();
        assert!(matches!(err, WaitError::SemaphoreOverflow { current: 3, requested: 2, max: 4 }));
        // Count unchanged after the failed signal
        assert_eq!(sem.count(), 3);
    }

    #[test]
    fn test_arithmetic_overflow_reported_not_panicked() {
        let sem = Semaphore::new(2, usize::MAX);
        let err = sem.signal(usize::MAX).unwrap_err();
        assert!(matches!(
            err,
            WaitError::SemaphoreOverflow {
                current: 2,
                requested: usize::MAX,
                ..
            }
        ));
        assert_eq!(sem.count(), 2);
    }

    #[test]
    fn test_signal_wakes_waiters() {
        let sem = Arc::new(Semaphore::new(0, 10));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let sem = sem.clone();
                thread::spawn(move || sem.wait_for(Timeout::from_millis(1000)).unwrap())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        sem.signal(2).unwrap();

        for handle in handles {
            assert!(handle.join().unwrap().is_signaled());
        }
        assert_eq!(sem.count(), 0);
    }
}
