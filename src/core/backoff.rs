/*!
 * Adaptive Spin Backoff
 *
 * Bounded spinning before a thread falls back to a real blocking wait.
 * Optimized for the common short-contention case where the owner releases
 * within a few hundred iterations.
 */

use std::thread;
use std::time::{Duration, Instant};

/// Adaptive spin helper.
///
/// Spins up to `max_spins` iterations or `spin_duration` wall-clock time,
/// yielding to the scheduler every few iterations, then reports exhaustion
/// so the caller can park on a real waitable.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    spin_duration: Duration,
    max_spins: u32,
}

impl Backoff {
    pub fn new(spin_duration: Duration, max_spins: u32) -> Self {
        Self {
            spin_duration,
            max_spins,
        }
    }

    /// Defaults tuned for sub-100µs contention windows.
    pub fn with_defaults() -> Self {
        Self::new(Duration::from_micros(50), 500)
    }

    /// Fixed iteration count, no wall-clock bound. Used by
    /// `try_lock(spins)`-style entry points.
    pub fn spins_only(max_spins: u32) -> Self {
        Self::new(Duration::MAX, max_spins)
    }

    /// Spin until `check` returns true or the backoff is exhausted.
    ///
    /// Returns true if `check` succeeded, false on exhaustion.
    pub fn spin_while(&self, mut check: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        let mut spin_count = 0u32;

        loop {
            if check() {
                return true;
            }

            if spin_count >= self.max_spins || start.elapsed() >= self.spin_duration {
                return false;
            }

            // Yield to scheduler occasionally
            if spin_count % 10 == 0 {
                thread::yield_now();
            } else {
                std::hint::spin_loop();
            }

            spin_count += 1;
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::with_defaults()
    }
}
