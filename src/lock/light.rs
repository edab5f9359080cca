/*!
 * Light User-Mode Lock
 *
 * Mutual exclusion with an allocation-free uncontended path: one atomic
 * compare-and-swap to acquire, one store to release. The backing wait
 * event is created lazily the first time contention is observed, so a lock
 * that is never fought over never touches a real wait object.
 *
 * No fairness guarantee: the longest-waiting thread is not necessarily
 * served next.
 */

use super::token::LockToken;
use super::traits::{LockError, LockKind, LockResult, Lockable, LockableId, RawLockable};
use crate::core::{Backoff, TimeBudget, Timeout};
use crate::waitable::{wait_with_abort, Event, WaitStatus, Waitable};
use log::trace;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Light mutual-exclusion lock issuing `LockKind::Exclusive` tokens.
pub struct LightLock {
    id: LockableId,
    locked: AtomicBool,
    waiters: AtomicUsize,
    /// Created on first contention only.
    event: OnceLock<Event>,
}

impl LightLock {
    pub fn new() -> Self {
        Self {
            id: LockableId::next(),
            locked: AtomicBool::new(false),
            waiters: AtomicUsize::new(0),
            event: OnceLock::new(),
        }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// True if the lock is currently held by someone.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Whether contention has ever forced the wait event into existence.
    pub fn contended_once(&self) -> bool {
        self.event.get().is_some()
    }
}

impl Default for LightLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RawLockable for LightLock {
    fn lockable_id(&self) -> LockableId {
        self.id
    }

    fn unlock(&self, kind: LockKind) {
        match kind {
            LockKind::Exclusive => {
                self.locked.store(false, Ordering::Release);
                if self.waiters.load(Ordering::Acquire) > 0 {
                    if let Some(event) = self.event.get() {
                        // Auto-reset: exactly one blocked waiter gets a shot.
                        event.set();
                    }
                }
            }
            other => unreachable!("light lock released with {} token", other),
        }
    }
}

impl Lockable for LightLock {
    fn lock(&self, timeout: Timeout, abort: Option<&dyn Waitable>) -> LockResult<LockToken<'_>> {
        if self.try_acquire() {
            return Ok(LockToken::bind(self, LockKind::Exclusive));
        }

        let budget = TimeBudget::start(timeout);
        let backoff = Backoff::with_defaults();
        if backoff.spin_while(|| self.try_acquire()) {
            return Ok(LockToken::bind(self, LockKind::Exclusive));
        }

        // Contention confirmed: fall back to the (lazily created) event.
        let event = self.event.get_or_init(|| {
            trace!("light lock: first contention, creating wait event");
            Event::auto()
        });

        loop {
            // Register as a waiter before the re-check: a release that runs
            // after our failed CAS then sees the waiter count and sets the
            // auto-reset event, which the wait below consumes.
            self.waiters.fetch_add(1, Ordering::AcqRel);
            if self.try_acquire() {
                self.waiters.fetch_sub(1, Ordering::AcqRel);
                return Ok(LockToken::bind(self, LockKind::Exclusive));
            }
            if budget.expired() {
                self.waiters.fetch_sub(1, Ordering::AcqRel);
                return Err(LockError::Timeout);
            }

            let status = wait_with_abort(event, abort, budget.remaining());
            self.waiters.fetch_sub(1, Ordering::AcqRel);

            match status? {
                WaitStatus::Aborted => return Err(LockError::Aborted),
                // Signaled or timed out: both re-check the flag, the budget
                // loop decides whether to keep going.
                _ => {}
            }
        }
    }

    fn try_lock(&self, spins: u32) -> Option<LockToken<'_>> {
        if Backoff::spins_only(spins).spin_while(|| self.try_acquire()) {
            Some(LockToken::bind(self, LockKind::Exclusive))
        } else {
            None
        }
    }
}
