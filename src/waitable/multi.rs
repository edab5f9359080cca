/*!
 * Composite Waits
 *
 * Wait on a set of waitables simultaneously. Condvar-backed objects cannot
 * be multiplexed by the host the way kernel handles can, so `wait_any`
 * polls its members non-blockingly under an adaptive backoff that decays to
 * short parks; `wait_all` acquires members in sequence against one shared
 * wall-clock budget.
 */

use super::traits::{WaitError, WaitResult, WaitStatus, Waitable};
use crate::core::{Backoff, TimeBudget, Timeout};
use std::thread;
use std::time::Duration;

/// Park step between poll sweeps once spinning is exhausted.
const POLL_PARK: Duration = Duration::from_millis(1);

/// Wait until any member signals, resolving to the member's index.
///
/// Members are polled in slot order each sweep, so on simultaneous signals
/// the lowest index wins. Returns `SignaledAt(i)` / `AbandonedAt(i)`,
/// `Aborted` if a member reports its own teardown, or `TimedOut`.
pub fn wait_any(waitables: &[&dyn Waitable], timeout: Timeout) -> WaitResult<WaitStatus> {
    if waitables.is_empty() {
        return Err(WaitError::EmptyWaitSet);
    }

    let budget = TimeBudget::start(timeout);
    let backoff = Backoff::with_defaults();
    let mut spinning = true;

    loop {
        for (i, waitable) in waitables.iter().enumerate() {
            match waitable.try_wait()? {
                WaitStatus::Signaled | WaitStatus::SignaledAt(_) => {
                    return Ok(WaitStatus::SignaledAt(i));
                }
                WaitStatus::Abandoned | WaitStatus::AbandonedAt(_) => {
                    return Ok(WaitStatus::AbandonedAt(i));
                }
                WaitStatus::Aborted => return Ok(WaitStatus::Aborted),
                WaitStatus::TimedOut => {}
            }
        }

        if budget.expired() {
            return Ok(WaitStatus::TimedOut);
        }

        if spinning {
            // One bounded spin window up front, then fall back to parking.
            backoff.spin_while(|| false);
            spinning = false;
        } else {
            thread::sleep(budget.remaining().min_duration(POLL_PARK));
        }
    }
}

/// Wait until every member has signaled, in slot order, against one shared
/// budget.
///
/// Aggregates to `Signaled` (or `Abandoned` if any member was abandoned).
/// Members are not consumed until a sweep over [`Waitable::ready_hint`]
/// reports the whole set ready, so a member that never signals times the
/// call out with nothing drained. The drain itself is sequential; a signal
/// stolen by a third party between sweep and drain can still cost a
/// consumed unit on an earlier member.
pub fn wait_all(waitables: &[&dyn Waitable], timeout: Timeout) -> WaitResult<WaitStatus> {
    if waitables.is_empty() {
        return Err(WaitError::EmptyWaitSet);
    }

    let budget = TimeBudget::start(timeout);
    let backoff = Backoff::with_defaults();
    let mut spinning = true;

    while !waitables.iter().all(|w| w.ready_hint()) {
        if budget.expired() {
            return Ok(WaitStatus::TimedOut);
        }
        if spinning {
            backoff.spin_while(|| false);
            spinning = false;
        } else {
            thread::sleep(budget.remaining().min_duration(POLL_PARK));
        }
    }

    let mut any_abandoned = false;
    for waitable in waitables {
        match waitable.wait_for(budget.remaining())? {
            WaitStatus::Signaled | WaitStatus::SignaledAt(_) => {}
            WaitStatus::Abandoned | WaitStatus::AbandonedAt(_) => any_abandoned = true,
            WaitStatus::TimedOut => return Ok(WaitStatus::TimedOut),
            WaitStatus::Aborted => return Ok(WaitStatus::Aborted),
        }
    }

    Ok(if any_abandoned {
        WaitStatus::Abandoned
    } else {
        WaitStatus::Signaled
    })
}

/// Wait on `primary`, cut short by an optional external abort waitable.
///
/// Any signal on `abort` resolves the wait to `Aborted` regardless of
/// remaining budget; this is the building block behind every gated
/// operation that accepts an abort. Without an abort this is a plain
/// delegated wait (no polling).
pub fn wait_with_abort(
    primary: &dyn Waitable,
    abort: Option<&dyn Waitable>,
    timeout: Timeout,
) -> WaitResult<WaitStatus> {
    match abort {
        None => primary.wait_for(timeout),
        Some(abort) => match wait_any(&[primary, abort], timeout)? {
            WaitStatus::SignaledAt(0) => Ok(WaitStatus::Signaled),
            WaitStatus::SignaledAt(_) => Ok(WaitStatus::Aborted),
            WaitStatus::AbandonedAt(0) => Ok(WaitStatus::Abandoned),
            WaitStatus::AbandonedAt(_) => Ok(WaitStatus::Aborted),
            other => Ok(other),
        },
    }
}
