/*!
 * Waitable Contract
 *
 * The uniform bounded-timeout wait capability every signaling object in
 * this crate exposes, plus the exhaustive wait outcome and the wait-layer
 * error type.
 */

use crate::core::Timeout;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a wait.
///
/// Timeout and abort are outcomes, not errors; `Err` on a wait means the
/// wait machinery itself failed and must be surfaced, never retried
/// silently. The indexed forms are produced by composite waits and identify
/// which member fired. `Abandoned` mirrors the abandoned-mutex outcome of
/// the underlying model; none of the primitives this crate ships can
/// produce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStatus {
    /// The waitable (or, for an all-wait, every member) became signaled.
    Signaled,
    /// Member `i` of a composite wait became signaled.
    SignaledAt(usize),
    /// The owner of a mutual-exclusion waitable terminated while holding it.
    Abandoned,
    /// Member `i` of a composite wait was abandoned.
    AbandonedAt(usize),
    /// The timeout budget elapsed first.
    TimedOut,
    /// An external abort waitable fired, or the object was torn down.
    Aborted,
}

impl WaitStatus {
    /// True for `Signaled` / `SignaledAt(_)`.
    #[inline]
    pub fn is_signaled(self) -> bool {
        matches!(self, WaitStatus::Signaled | WaitStatus::SignaledAt(_))
    }

    #[inline]
    pub fn is_timed_out(self) -> bool {
        matches!(self, WaitStatus::TimedOut)
    }
}

/// Wait-layer errors (machinery failures and misuse, never timeouts)
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic, Serialize, Deserialize)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum WaitError {
    #[error("Semaphore overflow: count {current} + {requested} exceeds max {max}")]
    #[diagnostic(
        code(sync::wait::semaphore_overflow),
        help("Signal fewer units or construct the semaphore with a larger maximum")
    )]
    SemaphoreOverflow {
        current: usize,
        requested: usize,
        max: usize,
    },

    #[error("Composite wait invoked with an empty waitable set")]
    #[diagnostic(code(sync::wait::empty_set))]
    EmptyWaitSet,

    #[error("Alarm clock is already armed")]
    #[diagnostic(
        code(sync::wait::already_armed),
        help("Disarm or fire the pending alarm before arming again")
    )]
    AlreadyArmed,

    #[error("OS error {code}: {message}")]
    #[diagnostic(code(sync::wait::os_error))]
    Os { code: i32, message: String },

    #[error("Not supported: {0}")]
    #[diagnostic(code(sync::wait::unsupported))]
    Unsupported(String),
}

/// Result type for wait operations
pub type WaitResult<T> = std::result::Result<T, WaitError>;

/// Anything exposing a bounded-timeout "wait until signaled" contract.
///
/// `timeout = Timeout::Forever` blocks indefinitely; `Timeout::ZERO` polls
/// without blocking. Object-safe so composite waits can mix concrete
/// waitables.
pub trait Waitable: Send + Sync {
    /// Block the calling thread until signaled, up to `timeout`.
    fn wait_for(&self, timeout: Timeout) -> WaitResult<WaitStatus>;

    /// Non-blocking poll.
    fn try_wait(&self) -> WaitResult<WaitStatus> {
        self.wait_for(Timeout::ZERO)
    }

    /// Non-consuming readiness hint: `true` when a wait would likely
    /// resolve right now. Composite all-waits sweep on this before they
    /// start consuming signals. Implementors without a cheap answer keep
    /// the default, which claims readiness and costs only the old window.
    fn ready_hint(&self) -> bool {
        true
    }
}

impl<W: Waitable + ?Sized> Waitable for &W {
    fn wait_for(&self, timeout: Timeout) -> WaitResult<WaitStatus> {
        (**self).wait_for(timeout)
    }

    fn ready_hint(&self) -> bool {
        (**self).ready_hint()
    }
}

impl<W: Waitable + ?Sized> Waitable for std::sync::Arc<W> {
    fn wait_for(&self, timeout: Timeout) -> WaitResult<WaitStatus> {
        (**self).wait_for(timeout)
    }

    fn ready_hint(&self) -> bool {
        (**self).ready_hint()
    }
}
