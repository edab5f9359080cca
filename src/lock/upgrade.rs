/*!
 * Upgradable Reader/Writer Lock
 *
 * Shared/exclusive locking as an explicit state machine: reader count,
 * writer flag, pending-writer count, and a single promotion slot. A shared
 * holder can promote to exclusive (blocking until it is the sole holder,
 * then upgrading atomically) and demote back without ever fully releasing.
 *
 * Writer preference is the default policy: a pending exclusive request
 * blocks new shared acquisitions. `allow_reader_overtake` flips this.
 *
 * The state machine is independent of the blocking deque that nests it;
 * its test suite exercises it standalone.
 */

use super::token::LockToken;
use super::traits::{LockError, LockKind, LockResult, LockableId, RawLockable};
use crate::core::{Backoff, TimeBudget, Timeout};
use crate::waitable::Waitable;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Re-check interval for the external abort waitable while parked.
const ABORT_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Default)]
struct RwState {
    readers: usize,
    writer: bool,
    writers_waiting: usize,
    /// A shared holder is parked waiting to upgrade. At most one.
    promoting: bool,
}

impl RwState {
    #[inline]
    fn can_read(&self, writer_preference: bool) -> bool {
        !self.writer && !self.promoting && !(writer_preference && self.writers_waiting > 0)
    }

    #[inline]
    fn can_write(&self) -> bool {
        !self.writer && self.readers == 0 && !self.promoting
    }
}

/// Upgradable shared/exclusive lock.
pub struct UpgradeLock {
    id: LockableId,
    shared_kind: LockKind,
    exclusive_kind: LockKind,
    writer_preference: bool,
    state: Mutex<RwState>,
    changed: Condvar,
}

impl UpgradeLock {
    /// Standalone lock issuing `Shared` / `Exclusive` tokens.
    pub fn new() -> Self {
        Self::with_kinds(LockKind::Shared, LockKind::Exclusive)
    }

    /// Lock issuing custom token kinds (the deque embeds one issuing
    /// `IterShared` / `IterExclusive`).
    pub fn with_kinds(shared_kind: LockKind, exclusive_kind: LockKind) -> Self {
        Self {
            id: LockableId::next(),
            shared_kind,
            exclusive_kind,
            writer_preference: true,
            state: Mutex::new(RwState::default()),
            changed: Condvar::new(),
        }
    }

    /// Let new shared holders overtake a pending exclusive request.
    #[must_use]
    pub fn allow_reader_overtake(mut self) -> Self {
        self.writer_preference = false;
        self
    }

    /// Acquire in shared mode; any number of shared holders may coexist.
    pub fn lock_shared(
        &self,
        timeout: Timeout,
        abort: Option<&dyn Waitable>,
    ) -> LockResult<LockToken<'_>> {
        let budget = TimeBudget::start(timeout);
        let mut state = self.state.lock();
        loop {
            if state.can_read(self.writer_preference) {
                state.readers += 1;
                return Ok(LockToken::bind(self, self.shared_kind));
            }
            self.park(&mut state, &budget, abort)?;
        }
    }

    /// Acquire in exclusive mode; excludes all other holders.
    pub fn lock_exclusive(
        &self,
        timeout: Timeout,
        abort: Option<&dyn Waitable>,
    ) -> LockResult<LockToken<'_>> {
        let budget = TimeBudget::start(timeout);
        let mut state = self.state.lock();
        state.writers_waiting += 1;
        loop {
            if state.can_write() {
                state.writers_waiting -= 1;
                state.writer = true;
                return Ok(LockToken::bind(self, self.exclusive_kind));
            }
            if let Err(err) = self.park(&mut state, &budget, abort) {
                state.writers_waiting -= 1;
                // Readers held back by writer preference may proceed now.
                self.changed.notify_all();
                return Err(err);
            }
        }
    }

    /// Non-blocking shared acquisition with bounded spinning.
    pub fn try_lock_shared(&self, spins: u32) -> Option<LockToken<'_>> {
        self.try_acquire(spins, |state, pref| {
            if state.can_read(pref) {
                state.readers += 1;
                true
            } else {
                false
            }
        })
        .then(|| LockToken::bind(self, self.shared_kind))
    }

    /// Non-blocking exclusive acquisition with bounded spinning.
    pub fn try_lock_exclusive(&self, spins: u32) -> Option<LockToken<'_>> {
        self.try_acquire(spins, |state, _| {
            if state.can_write() {
                state.writer = true;
                true
            } else {
                false
            }
        })
        .then(|| LockToken::bind(self, self.exclusive_kind))
    }

    /// Upgrade a shared token to exclusive without releasing it.
    ///
    /// Blocks until every other shared holder has released. At most one
    /// holder may be promoting at a time; a second concurrent request is a
    /// misuse error. On timeout/abort the token stays shared and held.
    pub fn promote(
        &self,
        token: &mut LockToken<'_>,
        timeout: Timeout,
        abort: Option<&dyn Waitable>,
    ) -> LockResult<()> {
        self.check_token(token, self.shared_kind)?;

        let budget = TimeBudget::start(timeout);
        let mut state = self.state.lock();
        if state.promoting {
            return Err(LockError::PromotionContended);
        }
        state.promoting = true;

        loop {
            // Our own shared hold is the 1.
            if state.readers == 1 && !state.writer {
                state.readers = 0;
                state.writer = true;
                state.promoting = false;
                token.retag(self.exclusive_kind);
                return Ok(());
            }
            if let Err(err) = self.park(&mut state, &budget, abort) {
                state.promoting = false;
                self.changed.notify_all();
                return Err(err);
            }
        }
    }

    /// Downgrade an exclusive token back to shared. Never blocks.
    pub fn demote(&self, token: &mut LockToken<'_>) -> LockResult<()> {
        self.check_token(token, self.exclusive_kind)?;

        let mut state = self.state.lock();
        debug_assert!(state.writer && state.readers == 0);
        state.writer = false;
        state.readers = 1;
        token.retag(self.shared_kind);
        self.changed.notify_all();
        Ok(())
    }

    /// Shared holder count snapshot (diagnostics).
    pub fn shared_count(&self) -> usize {
        self.state.lock().readers
    }

    /// True while an exclusive holder is active.
    pub fn has_exclusive(&self) -> bool {
        self.state.lock().writer
    }

    fn check_token(&self, token: &LockToken<'_>, expected: LockKind) -> LockResult<()> {
        if !token.held_by(self) {
            return if token.is_held() {
                Err(LockError::ForeignToken)
            } else {
                Err(LockError::NotHeld)
            };
        }
        match token.kind() {
            Some(kind) if kind == expected => Ok(()),
            Some(kind) => Err(LockError::WrongKind {
                expected,
                actual: kind,
            }),
            None => Err(LockError::NotHeld),
        }
    }

    fn try_acquire(
        &self,
        spins: u32,
        mut attempt: impl FnMut(&mut RwState, bool) -> bool,
    ) -> bool {
        let pref = self.writer_preference;
        Backoff::spins_only(spins).spin_while(|| attempt(&mut self.state.lock(), pref))
    }

    /// One bounded park on the state condvar, honoring budget and abort.
    fn park(
        &self,
        state: &mut MutexGuard<'_, RwState>,
        budget: &TimeBudget,
        abort: Option<&dyn Waitable>,
    ) -> LockResult<()> {
        if budget.expired() {
            return Err(LockError::Timeout);
        }
        if let Some(abort) = abort {
            if abort.try_wait()?.is_signaled() {
                return Err(LockError::Aborted);
            }
        }

        match (budget.remaining(), abort) {
            (Timeout::Forever, None) => {
                self.changed.wait(state);
            }
            (remaining, Some(_)) => {
                // Bounded park so the abort waitable is observed promptly.
                self.changed.wait_for(state, remaining.min_duration(ABORT_POLL));
            }
            (Timeout::After(d), None) => {
                self.changed.wait_for(state, d);
            }
        }
        Ok(())
    }
}

impl Default for UpgradeLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RawLockable for UpgradeLock {
    fn lockable_id(&self) -> LockableId {
        self.id
    }

    fn unlock(&self, kind: LockKind) {
        let mut state = self.state.lock();
        if kind == self.shared_kind {
            debug_assert!(state.readers > 0);
            state.readers = state.readers.saturating_sub(1);
        } else if kind == self.exclusive_kind {
            debug_assert!(state.writer);
            state.writer = false;
        } else {
            unreachable!("upgrade lock released with {} token", kind);
        }
        self.changed.notify_all();
    }
}
