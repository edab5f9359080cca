/*!
 * Fixed-Delay Waitable
 *
 * Always "succeeds" after sleeping `min(timeout, delay)`. Used for "fire no
 * sooner than" pacing without a real signaling object: mixing one into a
 * wait guarantees at least the delay has passed, but never blocks the
 * caller past its own timeout.
 */

use super::traits::{WaitResult, WaitStatus, Waitable};
use crate::core::Timeout;
use std::thread;
use std::time::Duration;

/// Waitable that sleeps a fixed delay and reports `Signaled`.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Waitable for FixedDelay {
    fn wait_for(&self, timeout: Timeout) -> WaitResult<WaitStatus> {
        let nap = timeout.min_duration(self.delay);
        if !nap.is_zero() {
            thread::sleep(nap);
        }
        Ok(WaitStatus::Signaled)
    }
}
