/*!
 * Timeout and Wall-Clock Budget
 *
 * A single `Timeout` value and the `TimeBudget` that threads it through
 * multi-stage blocking calls. Every stage of a gated operation subtracts
 * elapsed wall-clock time before the next stage, so a logical call never
 * blocks longer in total than the caller allowed. `Forever` is the single
 * sentinel exempt from the bookkeeping.
 */

use std::time::{Duration, Instant};

/// Per-call blocking budget.
///
/// `Forever` blocks indefinitely; `After(Duration::ZERO)` polls without
/// blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Block until the condition holds, with no upper bound.
    Forever,
    /// Block for at most this long.
    After(Duration),
}

impl Timeout {
    /// Alias for `Timeout::Forever`.
    pub const FOREVER: Timeout = Timeout::Forever;

    /// Non-blocking poll.
    pub const ZERO: Timeout = Timeout::After(Duration::ZERO);

    #[inline]
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Timeout::After(Duration::from_millis(ms))
    }

    /// Remaining duration, or `None` for an unbounded wait.
    #[inline]
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Timeout::Forever => None,
            Timeout::After(d) => Some(d),
        }
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        matches!(self, Timeout::After(d) if d.is_zero())
    }

    /// Smaller of this timeout and `cap`. `Forever` is capped to `cap`.
    #[inline]
    pub fn min_duration(self, cap: Duration) -> Duration {
        match self {
            Timeout::Forever => cap,
            Timeout::After(d) => d.min(cap),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout::After(d)
    }
}

/// Wall-clock budget for one logical blocking call.
///
/// Created once at the entry point and consulted before each internal wait
/// stage. `remaining()` saturates at zero, so a stage that overran its slice
/// makes the next stage a poll rather than a fresh full-length wait.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    timeout: Timeout,
    started: Instant,
}

impl TimeBudget {
    #[inline]
    #[must_use]
    pub fn start(timeout: Timeout) -> Self {
        Self {
            timeout,
            started: Instant::now(),
        }
    }

    /// Unconsumed budget as a `Timeout` for the next wait stage.
    #[inline]
    pub fn remaining(&self) -> Timeout {
        match self.timeout {
            Timeout::Forever => Timeout::Forever,
            Timeout::After(d) => Timeout::After(d.saturating_sub(self.started.elapsed())),
        }
    }

    /// True once the whole budget has been consumed. Never true for
    /// `Forever`.
    #[inline]
    pub fn expired(&self) -> bool {
        match self.timeout {
            Timeout::Forever => false,
            Timeout::After(d) => self.started.elapsed() >= d,
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_forever_never_expires() {
        let budget = TimeBudget::start(Timeout::Forever);
        thread::sleep(Duration::from_millis(10));
        assert!(!budget.expired());
        assert_eq!(budget.remaining(), Timeout::Forever);
    }

    #[test]
    fn test_budget_counts_down() {
        let budget = TimeBudget::start(Timeout::from_millis(50));
        thread::sleep(Duration::from_millis(20));
        match budget.remaining() {
            Timeout::After(d) => assert!(d < Duration::from_millis(50)),
            Timeout::Forever => panic!("bounded budget reported Forever"),
        }
    }

    #[test]
    fn test_budget_saturates_at_zero() {
        let budget = TimeBudget::start(Timeout::from_millis(5));
        thread::sleep(Duration::from_millis(20));
        assert!(budget.expired());
        assert_eq!(budget.remaining(), Timeout::After(Duration::ZERO));
    }

    #[test]
    fn test_zero_is_poll() {
        assert!(Timeout::ZERO.is_zero());
        assert!(!Timeout::from_millis(1).is_zero());
        assert!(!Timeout::Forever.is_zero());
    }

    #[test]
    fn test_min_duration_caps_forever() {
        let cap = Duration::from_millis(100);
        assert_eq!(Timeout::Forever.min_duration(cap), cap);
        assert_eq!(Timeout::from_millis(10).min_duration(cap), Duration::from_millis(10));
        assert_eq!(Timeout::from_millis(500).min_duration(cap), cap);
    }
}
