/*!
 * Event
 *
 * Manual-reset and auto-reset signaling events built on
 * `parking_lot::Mutex` + `Condvar`. A manual-reset event stays signaled
 * until explicitly reset; an auto-reset event hands each signal to exactly
 * one waiter and clears itself. `set`, `reset`, and `pulse` are the only
 * mutators.
 */

use super::traits::{WaitResult, WaitStatus, Waitable};
use crate::core::{TimeBudget, Timeout};
use parking_lot::{Condvar, Mutex};

/// Reset behavior of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Stays signaled until `reset`; `set` wakes every waiter.
    Manual,
    /// Exactly one waiter observes each signal, then the event clears itself.
    Auto,
}

#[derive(Debug, Default)]
struct EventState {
    signaled: bool,
    waiters: usize,
    /// Manual-mode pulse generation; waiters present at the bump are released.
    pulse_gen: u64,
    /// Auto-mode pulse credits, consumed by at most one waiter each.
    pulse_credits: usize,
}

/// Waitable signaling event.
#[derive(Debug)]
pub struct Event {
    mode: ResetMode,
    state: Mutex<EventState>,
    condvar: Condvar,
}

impl Event {
    pub fn new(mode: ResetMode, initially_set: bool) -> Self {
        Self {
            mode,
            state: Mutex::new(EventState {
                signaled: initially_set,
                ..EventState::default()
            }),
            condvar: Condvar::new(),
        }
    }

    /// Manual-reset event, initially reset.
    pub fn manual() -> Self {
        Self::new(ResetMode::Manual, false)
    }

    /// Auto-reset event, initially reset.
    pub fn auto() -> Self {
        Self::new(ResetMode::Auto, false)
    }

    pub fn mode(&self) -> ResetMode {
        self.mode
    }

    /// Signal the event.
    ///
    /// Manual: wakes all waiters and stays set. Auto: stays set until one
    /// waiter (present or future) consumes it; wakes one present waiter.
    pub fn set(&self) {
        let mut state = self.state.lock();
        state.signaled = true;
        match self.mode {
            ResetMode::Manual => {
                self.condvar.notify_all();
            }
            ResetMode::Auto => {
                if state.waiters > 0 {
                    self.condvar.notify_one();
                }
            }
        }
    }

    /// Clear the signaled state. Pending pulse credits are left intact.
    pub fn reset(&self) {
        self.state.lock().signaled = false;
    }

    /// Release current waiters without leaving the event set.
    ///
    /// Manual: releases every thread currently waiting. Auto: releases at
    /// most one currently-waiting thread. A pulse with no waiters is lost.
    pub fn pulse(&self) {
        let mut state = self.state.lock();
        if state.waiters == 0 {
            return;
        }
        match self.mode {
            ResetMode::Manual => {
                state.pulse_gen = state.pulse_gen.wrapping_add(1);
                self.condvar.notify_all();
            }
            ResetMode::Auto => {
                state.pulse_credits += 1;
                self.condvar.notify_one();
            }
        }
    }

    /// Snapshot of the signaled flag.
    pub fn is_set(&self) -> bool {
        self.state.lock().signaled
    }

    /// Approximate number of blocked waiters (diagnostics).
    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters
    }
}

impl Waitable for Event {
    fn wait_for(&self, timeout: Timeout) -> WaitResult<WaitStatus> {
        let budget = TimeBudget::start(timeout);
        let mut state = self.state.lock();
        let entry_gen = state.pulse_gen;

        loop {
            if state.signaled {
                if self.mode == ResetMode::Auto {
                    state.signaled = false;
                }
                return Ok(WaitStatus::Signaled);
            }
            if state.pulse_gen != entry_gen {
                return Ok(WaitStatus::Signaled);
            }
            if state.pulse_credits > 0 {
                state.pulse_credits -= 1;
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
                    // A signal may land together with the timeout; the loop
                    // re-checks the state before reporting TimedOut.
                    self.condvar.wait_for(&mut state, d);
                }
            }
            state.waiters -= 1;
        }
    }

    fn ready_hint(&self) -> bool {
        self.is_set()
    }
}
