/*!
 * Deque Iteration Guards
 *
 * RAII guards implementing the deque's dual-mode iterator protocol. A
 * guard pairs a hold on the nested iterator lock with the matching view of
 * the backing sequence: shared guards coexist freely, the exclusive guard
 * stands alone and is the only path to structural mutation (`insert` /
 * `erase`), so mutating without the exclusive iterator lock is
 * unrepresentable.
 *
 * Promotion re-takes the sequence view under the upgraded iterator hold;
 * the caller's outer push+pop token is never touched.
 */

use super::deque::{BlockingDeque, DequeError, DequeResult};
use crate::core::Timeout;
use crate::lock::LockToken;
use crate::waitable::Waitable;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::collections::VecDeque;

/// Shared (const) traversal guard. Any number may coexist.
pub struct DequeReadGuard<'a, T> {
    deque: &'a BlockingDeque<T>,
    items: RwLockReadGuard<'a, VecDeque<T>>,
    token: LockToken<'a>,
}

impl<'a, T: Send + Sync> DequeReadGuard<'a, T> {
    pub(super) fn new(
        deque: &'a BlockingDeque<T>,
        items: RwLockReadGuard<'a, VecDeque<T>>,
        token: LockToken<'a>,
    ) -> Self {
        Self {
            deque,
            items,
            token,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Front-to-back traversal; call `.rev()` for the reverse form.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn back(&self) -> Option<&T> {
        self.items.back()
    }

    /// Kind of the iterator-lock token backing this guard (diagnostics).
    pub fn token_kind(&self) -> Option<crate::lock::LockKind> {
        self.token.kind()
    }

    /// Upgrade to an exclusive guard without releasing the caller's outer
    /// push+pop lock. Blocks until every other shared guard is gone; on
    /// timeout/abort the shared guard comes back unchanged.
    pub fn promote(
        self,
        timeout: Timeout,
        abort: Option<&dyn Waitable>,
    ) -> Result<DequeWriteGuard<'a, T>, (Self, DequeError)> {
        let Self {
            deque,
            items,
            mut token,
        } = self;

        // The sequence view must be surrendered while other shared holders
        // drain; the iterator lock still guards the structure.
        drop(items);

        match deque.iter_lock.promote(&mut token, timeout, abort) {
            Ok(()) => Ok(DequeWriteGuard {
                deque,
                items: deque.items.write(),
                token,
            }),
            Err(err) => Err((
                Self {
                    deque,
                    items: deque.items.read_recursive(),
                    token,
                },
                err.into(),
            )),
        }
    }
}

/// Exclusive (mutable) traversal guard; the only path to `insert`/`erase`.
pub struct DequeWriteGuard<'a, T> {
    deque: &'a BlockingDeque<T>,
    items: RwLockWriteGuard<'a, VecDeque<T>>,
    token: LockToken<'a>,
}

impl<'a, T: Send + Sync> DequeWriteGuard<'a, T> {
    pub(super) fn new(
        deque: &'a BlockingDeque<T>,
        items: RwLockWriteGuard<'a, VecDeque<T>>,
        token: LockToken<'a>,
    ) -> Self {
        Self {
            deque,
            items,
            token,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut T> {
        self.items.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.items.front_mut()
    }

    pub fn back_mut(&mut self) -> Option<&mut T> {
        self.items.back_mut()
    }

    /// Kind of the iterator-lock token backing this guard (diagnostics).
    pub fn token_kind(&self) -> Option<crate::lock::LockKind> {
        self.token.kind()
    }

    /// Insert at `index` (clamped to the current length), maintaining the
    /// deque's emptiness events.
    pub fn insert(&mut self, index: usize, value: T) {
        let was_empty = self.items.is_empty();
        let index = index.min(self.items.len());
        self.items.insert(index, value);
        if was_empty {
            self.deque.empty.reset();
            self.deque.content.set();
        }
    }

    /// Remove and return the element at `index`, maintaining the deque's
    /// emptiness events.
    pub fn erase(&mut self, index: usize) -> Option<T> {
        let removed = self.items.remove(index);
        if removed.is_some() && self.items.is_empty() {
            self.deque.content.reset();
            self.deque.empty.set();
        }
        removed
    }

    /// Downgrade back to a shared guard. Never blocks; the outer push+pop
    /// lock is untouched.
    pub fn demote(self) -> DequeResult<DequeReadGuard<'a, T>> {
        let Self {
            deque,
            items,
            mut token,
        } = self;

        drop(items);
        deque.iter_lock.demote(&mut token)?;
        Ok(DequeReadGuard {
            deque,
            items: deque.items.read_recursive(),
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deque::DequeError;
    use crate::lock::LockKind;
    use crate::waitable::Event;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn filled(values: &[u32]) -> BlockingDeque<u32> {
        let deque = BlockingDeque::new();
        for &v in values {
            deque.push_back(v, Timeout::ZERO, None).unwrap();
        }
        deque
    }

    #[test]
    fn test_shared_guards_coexist() {
        let deque = filled(&[1, 2, 3]);
        let outer = deque.lock_push_pop();

        let a = deque.read_iter(&outer, Timeout::ZERO, None).unwrap();
        let b = deque.read_iter(&outer, Timeout::ZERO, None).unwrap();

        assert_eq!(a.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(b.iter().rev().copied().collect::<Vec<_>>(), vec![3, 2, 1]);
        drop(a);
        drop(b);
        drop(outer);
    }

    #[test]
    fn test_exclusive_guard_excludes_shared() {
        let deque = Arc::new(filled(&[1, 2, 3]));
        let outer = deque.lock_push_pop();
        let writer = deque.write_iter(&outer, Timeout::ZERO, None).unwrap();

        let deque_clone = deque.clone();
        let handle = thread::spawn(move || {
            let outer = deque_clone.lock_push_pop();
            let denied = deque_clone
                .read_iter(&outer, Timeout::from_millis(80), None)
                .map(|_| ())
                .unwrap_err();
            let allowed = deque_clone
                .read_iter(&outer, Timeout::from_millis(2000), None)
                .is_ok();
            (denied, allowed)
        });

        thread::sleep(Duration::from_millis(300));
        drop(writer);

        let (denied, allowed) = handle.join().unwrap();
        assert_eq!(denied, DequeError::Timeout);
        assert!(allowed);
        drop(outer);
    }

    #[test]
    fn test_insert_and_erase_maintain_events() {
        let deque = filled(&[]);
        let outer = deque.lock_push_pop();

        let mut writer = deque.write_iter(&outer, Timeout::ZERO, None).unwrap();
        writer.insert(0, 10);
        writer.insert(1, 30);
        writer.insert(1, 20);
        assert_eq!(writer.iter().copied().collect::<Vec<_>>(), vec![10, 20, 30]);
        drop(writer);

        let (empty, content) = deque.emptiness_events();
        assert!(!empty);
        assert!(content);

        let mut writer = deque.write_iter(&outer, Timeout::ZERO, None).unwrap();
        assert_eq!(writer.erase(1), Some(20));
        assert_eq!(writer.erase(5), None);
        assert_eq!(writer.erase(0), Some(10));
        assert_eq!(writer.erase(0), Some(30));
        drop(writer);
        drop(outer);

        let (empty, content) = deque.emptiness_events();
        assert!(empty);
        assert!(!content);
        assert!(deque.is_empty());
    }

    #[test]
    fn test_iter_mut_mutates_in_place() {
        let deque = filled(&[1, 2, 3]);
        let outer = deque.lock_push_pop();

        let mut writer = deque.write_iter(&outer, Timeout::ZERO, None).unwrap();
        for value in writer.iter_mut() {
            *value *= 10;
        }
        drop(writer);

        let reader = deque.read_iter(&outer, Timeout::ZERO, None).unwrap();
        assert_eq!(reader.iter().copied().collect::<Vec<_>>(), vec![10, 20, 30]);
        drop(reader);
        drop(outer);
    }

    #[test]
    fn test_promote_blocks_until_readers_leave() {
        let deque = Arc::new(filled(&[1, 2, 3]));
        let outer = deque.lock_push_pop();
        let mine = deque.read_iter(&outer, Timeout::ZERO, None).unwrap();

        // The competing reader lives entirely on its own thread; its guard
        // is tied to that thread's stack.
        let deque_clone = deque.clone();
        let other_ready = Arc::new(Event::manual());
        let ready_clone = other_ready.clone();
        let handle = thread::spawn(move || {
            let other_outer = deque_clone.lock_push_pop();
            let other = deque_clone
                .read_iter(&other_outer, Timeout::ZERO, None)
                .unwrap();
            ready_clone.set();
            thread::sleep(Duration::from_millis(100));
            drop(other);
            drop(other_outer);
        });

        other_ready.wait_for(Timeout::from_millis(2000)).unwrap();
        let mut writer = match mine.promote(Timeout::from_millis(2000), None) {
            Ok(writer) => writer,
            Err((_, err)) => panic!("promotion failed: {err}"),
        };
        writer.insert(0, 0);
        assert_eq!(writer.len(), 4);

        // Demote and keep reading under the same outer token.
        let reader = writer.demote().unwrap();
        assert_eq!(reader.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        drop(reader);

        handle.join().unwrap();
        drop(outer);
    }

    #[test]
    fn test_promote_timeout_returns_shared_guard() {
        let deque = filled(&[1]);
        let outer = deque.lock_push_pop();
        let mine = deque.read_iter(&outer, Timeout::ZERO, None).unwrap();
        let other = deque.read_iter(&outer, Timeout::ZERO, None).unwrap();

        let (mine, err) = mine
            .promote(Timeout::from_millis(50), None)
            .err()
            .expect("promotion must time out while another reader is live");
        assert_eq!(err, DequeError::Timeout);
        // Still a working shared guard.
        assert_eq!(mine.get(0), Some(&1));
        assert_eq!(mine.token_kind(), Some(LockKind::IterShared));
        drop(other);
        drop(mine);
        drop(outer);
    }
}
