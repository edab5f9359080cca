/*!
 * Blocking Deque Core
 *
 * Gated push/pop, hold tokens, drain-and-lock, and teardown. The backing
 * sequence sits behind a `parking_lot::RwLock` (the short lock); gate and
 * emptiness events are recomputed synchronously with every mutation while
 * that lock is held.
 */

use super::guards::{DequeReadGuard, DequeWriteGuard};
use crate::core::{TimeBudget, Timeout};
use crate::lock::{LockError, LockKind, LockToken, LockableId, RawLockable, UpgradeLock};
use crate::waitable::{wait_with_abort, Event, WaitError, WaitStatus, Waitable};
use log::{debug, trace, warn};
use miette::Diagnostic;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Deque-layer errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic, Serialize, Deserialize)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum DequeError {
    #[error("Deque operation timed out")]
    #[diagnostic(code(sync::deque::timeout))]
    Timeout,

    #[error("Deque operation aborted by external signal")]
    #[diagnostic(code(sync::deque::aborted))]
    Aborted,

    #[error("Deque is being torn down")]
    #[diagnostic(code(sync::deque::teardown))]
    Teardown,

    #[error("Iterator acquisition requires a push+pop lock, got a {actual} lock")]
    #[diagnostic(
        code(sync::deque::requires_push_pop),
        help("Acquire the hold with lock_push_pop or drain_and_lock before iterating")
    )]
    RequiresPushPop { actual: LockKind },

    #[error("Lock token was issued by a different deque")]
    #[diagnostic(code(sync::deque::foreign_lock))]
    ForeignLock,

    #[error("Lock error during deque operation: {0}")]
    #[diagnostic(transparent)]
    Lock(LockError),

    #[error("Wait error during deque operation: {0}")]
    #[diagnostic(transparent)]
    Wait(#[from] WaitError),
}

impl From<LockError> for DequeError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout => DequeError::Timeout,
            LockError::Aborted => DequeError::Aborted,
            LockError::NotHeld => DequeError::Lock(LockError::NotHeld),
            other => DequeError::Lock(other),
        }
    }
}

/// Result type for deque operations
pub type DequeResult<T> = std::result::Result<T, DequeError>;

#[derive(Debug, Default)]
struct HoldCounters {
    push: usize,
    pop: usize,
}

/// Blocking double-ended queue with gated operations and dual-mode
/// iteration.
pub struct BlockingDeque<T> {
    id: LockableId,
    /// The short internal lock around the backing sequence.
    pub(super) items: RwLock<VecDeque<T>>,
    holds: Mutex<HoldCounters>,
    /// Set ⇔ no exclusive push-blocking hold outstanding.
    push_gate: Event,
    /// Set ⇔ no exclusive pop-blocking hold outstanding.
    pop_gate: Event,
    /// Set ⇔ sequence is empty. Complement of `content` at all times.
    pub(super) empty: Event,
    /// Set ⇔ sequence is non-empty.
    pub(super) content: Event,
    /// Nested reader/writer lock for stable traversal.
    pub(super) iter_lock: UpgradeLock,
    teardown: AtomicBool,
}

impl<T: Send + Sync> BlockingDeque<T> {
    pub fn new() -> Self {
        Self {
            id: LockableId::next(),
            items: RwLock::new(VecDeque::new()),
            holds: Mutex::new(HoldCounters::default()),
            push_gate: Event::new(crate::waitable::ResetMode::Manual, true),
            pop_gate: Event::new(crate::waitable::ResetMode::Manual, true),
            empty: Event::new(crate::waitable::ResetMode::Manual, true),
            content: Event::new(crate::waitable::ResetMode::Manual, false),
            iter_lock: UpgradeLock::with_kinds(LockKind::IterShared, LockKind::IterExclusive),
            teardown: AtomicBool::new(false),
        }
    }

    /// Append at the back. Waits for the push gate, then appends under the
    /// short lock. Returns the new length.
    pub fn push_back(
        &self,
        value: T,
        timeout: Timeout,
        abort: Option<&dyn Waitable>,
    ) -> DequeResult<usize> {
        self.push_impl(value, timeout, abort, true)
    }

    /// Prepend at the front; otherwise identical to [`Self::push_back`].
    pub fn push_front(
        &self,
        value: T,
        timeout: Timeout,
        abort: Option<&dyn Waitable>,
    ) -> DequeResult<usize> {
        self.push_impl(value, timeout, abort, false)
    }

    fn push_impl(
        &self,
        value: T,
        timeout: Timeout,
        abort: Option<&dyn Waitable>,
        back: bool,
    ) -> DequeResult<usize> {
        let budget = TimeBudget::start(timeout);
        loop {
            if self.is_tearing_down() {
                return Err(DequeError::Teardown);
            }

            self.await_gate(&self.push_gate, abort, &budget)?;

            // The gate may have closed again between the wait and here;
            // re-check under the hold-counter lock.
            let holds = self.holds.lock();
            if holds.push > 0 {
                continue;
            }
            let mut items = self.items.write();
            drop(holds);

            let was_empty = items.is_empty();
            if back {
                items.push_back(value);
            } else {
                items.push_front(value);
            }
            if was_empty {
                self.empty.reset();
                self.content.set();
            }
            return Ok(items.len());
        }
    }

    /// Remove from the front. Waits for the pop gate, then for content if
    /// the sequence is empty, retrying the whole gate-and-check loop on one
    /// shared wall-clock budget.
    pub fn pop_front(&self, timeout: Timeout, abort: Option<&dyn Waitable>) -> DequeResult<T> {
        self.pop_impl(timeout, abort, true)
    }

    /// Remove from the back; otherwise identical to [`Self::pop_front`].
    pub fn pop_back(&self, timeout: Timeout, abort: Option<&dyn Waitable>) -> DequeResult<T> {
        self.pop_impl(timeout, abort, false)
    }

    fn pop_impl(
        &self,
        timeout: Timeout,
        abort: Option<&dyn Waitable>,
        front: bool,
    ) -> DequeResult<T> {
        let budget = TimeBudget::start(timeout);
        loop {
            if self.is_tearing_down() {
                return Err(DequeError::Teardown);
            }

            self.await_gate(&self.pop_gate, abort, &budget)?;

            let holds = self.holds.lock();
            if holds.pop > 0 {
                continue;
            }
            let mut items = self.items.write();
            drop(holds);

            let value = if front {
                items.pop_front()
            } else {
                items.pop_back()
            };
            match value {
                Some(value) => {
                    if items.is_empty() {
                        self.content.reset();
                        self.empty.set();
                    }
                    return Ok(value);
                }
                None => {
                    // Empty: release the short lock and wait for content,
                    // then retry the whole loop on the remaining budget.
                    drop(items);
                    self.await_gate(&self.content, abort, &budget)?;
                }
            }
        }
    }

    /// Close the push gate. While the returned token is held, every push
    /// blocks (and times out on its own budget).
    pub fn lock_push(&self) -> LockToken<'_> {
        let mut holds = self.holds.lock();
        holds.push += 1;
        if holds.push == 1 {
            trace!("deque {:?}: push gate closed", self.id);
            self.push_gate.reset();
        }
        LockToken::bind(self, LockKind::Push)
    }

    /// Close the pop gate.
    pub fn lock_pop(&self) -> LockToken<'_> {
        let mut holds = self.holds.lock();
        holds.pop += 1;
        if holds.pop == 1 {
            trace!("deque {:?}: pop gate closed", self.id);
            self.pop_gate.reset();
        }
        LockToken::bind(self, LockKind::Pop)
    }

    /// Close both gates. The returned token is the precondition for
    /// iterator acquisition.
    pub fn lock_push_pop(&self) -> LockToken<'_> {
        let mut holds = self.holds.lock();
        holds.push += 1;
        holds.pop += 1;
        if holds.push == 1 {
            self.push_gate.reset();
        }
        if holds.pop == 1 {
            self.pop_gate.reset();
        }
        trace!("deque {:?}: push+pop gates closed", self.id);
        LockToken::bind(self, LockKind::PushPop)
    }

    /// Take a push lock, then wait until the sequence is observed empty
    /// (pops may still be racing in). While the returned push token is
    /// held the deque cannot grow, so emptiness is stable.
    pub fn drain_and_lock(
        &self,
        timeout: Timeout,
        abort: Option<&dyn Waitable>,
    ) -> DequeResult<LockToken<'_>> {
        let budget = TimeBudget::start(timeout);
        let token = self.lock_push();

        loop {
            if self.is_tearing_down() {
                return Err(DequeError::Teardown);
            }
            if self.items.read_recursive().is_empty() {
                debug!("deque {:?}: drained and push-locked", self.id);
                return Ok(token);
            }
            // Re-checked after every wake; a pop observed empty may be
            // followed by nothing, or by another wake later.
            self.await_gate(&self.empty, abort, &budget)?;
        }
    }

    /// Shared (const) iteration. Requires a held push+pop token issued by
    /// this deque; acquires the nested iterator lock in shared mode.
    pub fn read_iter<'d>(
        &'d self,
        outer: &LockToken<'_>,
        timeout: Timeout,
        abort: Option<&dyn Waitable>,
    ) -> DequeResult<DequeReadGuard<'d, T>> {
        self.check_outer(outer)?;
        let token = self.iter_lock.lock_shared(timeout, abort)?;
        // Recursive: the caller may already hold another shared view, and a
        // queued writer (deflate) must not wedge it against itself.
        Ok(DequeReadGuard::new(self, self.items.read_recursive(), token))
    }

    /// Mutable iteration. Requires a held push+pop token; acquires the
    /// iterator lock in exclusive mode.
    pub fn write_iter<'d>(
        &'d self,
        outer: &LockToken<'_>,
        timeout: Timeout,
        abort: Option<&dyn Waitable>,
    ) -> DequeResult<DequeWriteGuard<'d, T>> {
        self.check_outer(outer)?;
        let token = self.iter_lock.lock_exclusive(timeout, abort)?;
        Ok(DequeWriteGuard::new(self, self.items.write(), token))
    }

    /// Current length; takes only the short lock. Recursive so a thread
    /// holding a read guard can still ask while a writer is queued.
    pub fn len(&self) -> usize {
        self.items.read_recursive().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read_recursive().is_empty()
    }

    /// Release over-provisioned backing capacity.
    pub fn deflate(&self) {
        let mut items = self.items.write();
        let before = items.capacity();
        items.shrink_to_fit();
        debug!(
            "deque {:?}: deflated capacity {} -> {}",
            self.id,
            before,
            items.capacity()
        );
    }

    /// Begin teardown: every in-flight and future gated operation fails
    /// with [`DequeError::Teardown`] instead of proceeding.
    pub fn close(&self) {
        if self.teardown.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("deque {:?}: teardown begun", self.id);
        // Wake every blocked waiter; each re-checks the teardown flag
        // before trusting the gate it woke on.
        self.push_gate.set();
        self.pop_gate.set();
        self.empty.set();
        self.content.set();
    }

    /// True once teardown has begun.
    pub fn is_tearing_down(&self) -> bool {
        self.teardown.load(Ordering::Acquire)
    }

    /// Emptiness-event snapshot (diagnostics and invariant tests).
    pub fn emptiness_events(&self) -> (bool, bool) {
        (self.empty.is_set(), self.content.is_set())
    }

    /// One wait stage against a gate event, charging the shared budget.
    fn await_gate(
        &self,
        gate: &Event,
        abort: Option<&dyn Waitable>,
        budget: &TimeBudget,
    ) -> DequeResult<()> {
        match wait_with_abort(gate, abort, budget.remaining())? {
            WaitStatus::TimedOut => Err(DequeError::Timeout),
            WaitStatus::Aborted => Err(DequeError::Aborted),
            _ => Ok(()),
        }
    }

    fn check_outer(&self, outer: &LockToken<'_>) -> DequeResult<()> {
        if !outer.held_by(self) {
            return if outer.is_held() {
                Err(DequeError::ForeignLock)
            } else {
                Err(DequeError::Lock(LockError::NotHeld))
            };
        }
        match outer.kind() {
            Some(LockKind::PushPop) => Ok(()),
            Some(actual) => Err(DequeError::RequiresPushPop { actual }),
            None => Err(DequeError::Lock(LockError::NotHeld)),
        }
    }
}

impl<T: Send + Sync> Default for BlockingDeque<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RawLockable for BlockingDeque<T>
where
    T: Send + Sync,
{
    fn lockable_id(&self) -> LockableId {
        self.id
    }

    fn unlock(&self, kind: LockKind) {
        let mut holds = self.holds.lock();
        match kind {
            LockKind::Push => {
                holds.push -= 1;
                if holds.push == 0 {
                    trace!("deque {:?}: push gate reopened", self.id);
                    self.push_gate.set();
                }
            }
            LockKind::Pop => {
                holds.pop -= 1;
                if holds.pop == 0 {
                    trace!("deque {:?}: pop gate reopened", self.id);
                    self.pop_gate.set();
                }
            }
            LockKind::PushPop => {
                holds.push -= 1;
                holds.pop -= 1;
                if holds.push == 0 {
                    self.push_gate.set();
                }
                if holds.pop == 0 {
                    self.pop_gate.set();
                }
                trace!("deque {:?}: push+pop gates released", self.id);
            }
            other => unreachable!("deque released with {} token", other),
        }
    }
}

impl<T> Drop for BlockingDeque<T> {
    fn drop(&mut self) {
        self.teardown.store(true, Ordering::Release);

        let leftover = self.items.get_mut().len();
        if leftover > 0 {
            warn!(
                "deque {:?}: dropped with {} leftover element(s)",
                self.id, leftover
            );
        }
        let holds = self.holds.get_mut();
        if holds.push > 0 || holds.pop > 0 {
            warn!(
                "deque {:?}: dropped with unreleased holds (push: {}, pop: {})",
                self.id, holds.push, holds.pop
            );
        }
    }
}
