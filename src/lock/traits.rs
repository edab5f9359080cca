/*!
 * Lockable Contract
 *
 * Capability traits for anything that issues scoped lock tokens, the
 * exhaustive kind tag carried inside every token, and the lock-layer error
 * type.
 */

use super::token::LockToken;
use crate::core::Timeout;
use crate::waitable::{WaitError, Waitable};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// What a lock token protects.
///
/// Chosen by the issuing lockable and matched exhaustively on release;
/// there is no runtime downcast anywhere in the release path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    /// Plain mutual exclusion.
    Exclusive,
    /// One of many concurrent shared holders.
    Shared,
    /// Blocks pushes on a deque.
    Push,
    /// Blocks pops on a deque.
    Pop,
    /// Blocks both, precondition for iterator acquisition.
    PushPop,
    /// Shared (const) traversal under a deque's iterator lock.
    IterShared,
    /// Exclusive (mutable) traversal under a deque's iterator lock.
    IterExclusive,
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockKind::Exclusive => "exclusive",
            LockKind::Shared => "shared",
            LockKind::Push => "push",
            LockKind::Pop => "pop",
            LockKind::PushPop => "push+pop",
            LockKind::IterShared => "shared-iterator",
            LockKind::IterExclusive => "exclusive-iterator",
        };
        f.write_str(name)
    }
}

/// Process-unique identity of a lockable instance.
///
/// Tokens remember their issuer's id so a passed-in token can be verified
/// before it is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockableId(u64);

impl LockableId {
    /// Allocate the next process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lock-layer errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic, Serialize, Deserialize)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum LockError {
    #[error("Lock acquisition timed out")]
    #[diagnostic(code(sync::lock::timeout))]
    Timeout,

    #[error("Lock acquisition aborted by external signal")]
    #[diagnostic(code(sync::lock::aborted))]
    Aborted,

    #[error("Wrong lock kind for operation: expected {expected}, got {actual}")]
    #[diagnostic(
        code(sync::lock::wrong_kind),
        help("Release the current token and acquire the kind this operation needs")
    )]
    WrongKind { expected: LockKind, actual: LockKind },

    #[error("Lock token was issued by a different lockable instance")]
    #[diagnostic(code(sync::lock::foreign_token))]
    ForeignToken,

    #[error("Lock token is not held")]
    #[diagnostic(code(sync::lock::not_held))]
    NotHeld,

    #[error("Accessor used without a bound lock")]
    #[diagnostic(code(sync::lock::invalid_accessor))]
    InvalidAccessor,

    #[error("Another shared holder is already waiting to promote")]
    #[diagnostic(
        code(sync::lock::promotion_contended),
        help("Only one shared holder may promote at a time; retry or release")
    )]
    PromotionContended,

    #[error("Wait error during lock acquisition: {0}")]
    #[diagnostic(transparent)]
    Wait(#[from] WaitError),
}

/// Result type for lock operations
pub type LockResult<T> = std::result::Result<T, LockError>;

/// Release side of a lockable: identity plus kind-dispatched unlock.
///
/// `unlock` is invoked exactly once per bound token, from [`LockToken`]'s
/// drop or explicit release. Implementations must treat a kind they never
/// issued as fail-fast misuse.
pub trait RawLockable: Send + Sync {
    fn lockable_id(&self) -> LockableId;
    fn unlock(&self, kind: LockKind);
}

/// Acquire side of a mutual-exclusion lockable.
pub trait Lockable: RawLockable {
    /// Block until acquired, up to `timeout`; any signal on `abort` cuts
    /// the wait short.
    fn lock(&self, timeout: Timeout, abort: Option<&dyn Waitable>) -> LockResult<LockToken<'_>>;

    /// Spin up to `spins` iterations without blocking.
    fn try_lock(&self, spins: u32) -> Option<LockToken<'_>>;
}
