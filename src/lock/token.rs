/*!
 * Lock Token
 *
 * A move-only handle representing at most one outstanding acquisition of a
 * lockable. A token is either empty (never acquired, released, or
 * moved-from) or bound to exactly one issuer and one [`LockKind`]; a bound
 * token releases exactly once, on drop or explicit release. Copying is
 * forbidden because locks are not reentrant-safe in general.
 */

use super::traits::{LockKind, RawLockable};
use std::fmt;

/// Scoped, move-only lock handle.
pub struct LockToken<'a> {
    issuer: Option<&'a dyn RawLockable>,
    kind: LockKind,
}

impl<'a> LockToken<'a> {
    /// Bind a freshly-granted acquisition to its issuer.
    pub(crate) fn bind(issuer: &'a dyn RawLockable, kind: LockKind) -> Self {
        Self {
            issuer: Some(issuer),
            kind,
        }
    }

    /// The permanently-empty token.
    pub fn released() -> Self {
        Self {
            issuer: None,
            kind: LockKind::Exclusive,
        }
    }

    /// True while the token is bound to an acquisition.
    #[inline]
    pub fn is_held(&self) -> bool {
        self.issuer.is_some()
    }

    /// Kind tag of the bound acquisition.
    #[inline]
    pub fn kind(&self) -> Option<LockKind> {
        self.issuer.map(|_| self.kind)
    }

    /// Confirm this token was issued by `lockable`. Used defensively before
    /// trusting a passed-in token.
    pub fn held_by(&self, lockable: &dyn RawLockable) -> bool {
        self.issuer
            .map(|issuer| issuer.lockable_id() == lockable.lockable_id())
            .unwrap_or(false)
    }

    /// Release now instead of at end of scope.
    pub fn release(mut self) {
        self.release_in_place();
    }

    /// Retag a bound token after its issuer changed the acquisition mode
    /// (promotion/demotion). The acquisition itself is untouched.
    pub(crate) fn retag(&mut self, kind: LockKind) {
        debug_assert!(self.issuer.is_some());
        self.kind = kind;
    }

    fn release_in_place(&mut self) {
        if let Some(issuer) = self.issuer.take() {
            issuer.unlock(self.kind);
        }
    }
}

impl Drop for LockToken<'_> {
    fn drop(&mut self) {
        self.release_in_place();
    }
}

impl fmt::Debug for LockToken<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.issuer {
            Some(issuer) => f
                .debug_struct("LockToken")
                .field("kind", &self.kind)
                .field("issuer", &issuer.lockable_id())
                .finish(),
            None => f.debug_struct("LockToken").field("held", &false).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::traits::LockableId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLock {
        id: LockableId,
        releases: AtomicUsize,
    }

    impl CountingLock {
        fn new() -> Self {
            Self {
                id: LockableId::next(),
                releases: AtomicUsize::new(0),
            }
        }
    }

    impl RawLockable for CountingLock {
        fn lockable_id(&self) -> LockableId {
            self.id
        }

        fn unlock(&self, _kind: LockKind) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_releases_exactly_once() {
        let lock = CountingLock::new();
        {
            let token = LockToken::bind(&lock, LockKind::Exclusive);
            assert!(token.is_held());
        }
        assert_eq!(lock.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_release_then_drop() {
        let lock = CountingLock::new();
        let token = LockToken::bind(&lock, LockKind::Push);
        token.release();
        assert_eq!(lock.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_token_never_releases() {
        {
            let token = LockToken::released();
            assert!(!token.is_held());
            assert_eq!(token.kind(), None);
        }
    }

    #[test]
    fn test_held_by_checks_issuer() {
        let lock_a = CountingLock::new();
        let lock_b = CountingLock::new();
        let token = LockToken::bind(&lock_a, LockKind::Pop);

        assert!(token.held_by(&lock_a));
        assert!(!token.held_by(&lock_b));
        assert!(!LockToken::released().held_by(&lock_a));
    }

    #[test]
    fn test_move_empties_source() {
        let lock = CountingLock::new();
        let token = LockToken::bind(&lock, LockKind::PushPop);
        let moved = token;
        assert!(moved.is_held());
        drop(moved);
        assert_eq!(lock.releases.load(Ordering::SeqCst), 1);
    }
}
