/*!
 * Synchronized Value + Accessor
 *
 * Wraps a value with a [`LightLock`] and hands out scoped `Accessor`
 * proxies that grant access only while the lock is held. The accessor is
 * the single sanctioned way to touch the wrapped value.
 */

use super::light::LightLock;
use super::token::LockToken;
use super::traits::{LockError, LockResult, Lockable};
use crate::core::Timeout;
use crate::waitable::Waitable;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// Value guarded by a light lock; access only through [`Accessor`].
pub struct Synchronized<T> {
    lock: LightLock,
    value: UnsafeCell<T>,
}

// Access to `value` is serialized by `lock`.
unsafe impl<T: Send> Send for Synchronized<T> {}
unsafe impl<T: Send> Sync for Synchronized<T> {}

impl<T> Synchronized<T> {
    pub fn new(value: T) -> Self {
        Self {
            lock: LightLock::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock and bind an accessor to it.
    pub fn pickup(
        &self,
        timeout: Timeout,
        abort: Option<&dyn Waitable>,
    ) -> LockResult<Accessor<'_, T>> {
        let token = self.lock.lock(timeout, abort)?;
        Ok(Accessor {
            owner: Some(self),
            _token: token,
            _marker: PhantomData,
        })
    }

    /// Non-blocking pickup; a failed attempt yields an *invalid* accessor
    /// rather than an error, so call sites deal in one object type.
    pub fn try_pickup(&self, spins: u32) -> Accessor<'_, T> {
        match self.lock.try_lock(spins) {
            Some(token) => Accessor {
                owner: Some(self),
                _token: token,
                _marker: PhantomData,
            },
            None => Self::null_accessor(),
        }
    }

    /// Permanently-invalid accessor sentinel.
    pub fn null_accessor<'a>() -> Accessor<'a, T> {
        Accessor {
            owner: None,
            _token: LockToken::released(),
            _marker: PhantomData,
        }
    }

    /// Consume the wrapper and take the value back.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

/// Scoped proxy granting access to a [`Synchronized`] value.
///
/// Move-only; valid iff bound to a held lock. `get`/`get_mut` report
/// invalid use as an error; `Deref`/`DerefMut` fail loudly (panic) instead,
/// for call sites that have already checked [`Accessor::is_valid`].
pub struct Accessor<'a, T> {
    owner: Option<&'a Synchronized<T>>,
    _token: LockToken<'a>,
    // Suppress the auto traits; the impls below carry the real bounds.
    _marker: PhantomData<*const T>,
}

// `get_mut` hands out `&mut T`, so moving an accessor moves access to `T`.
unsafe impl<T: Send> Send for Accessor<'_, T> {}
// A shared accessor only hands out `&T`; one lock hold does not serialize
// concurrent `get` calls from other threads, so `T` must be `Sync` itself.
unsafe impl<T: Send + Sync> Sync for Accessor<'_, T> {}

impl<'a, T> Accessor<'a, T> {
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.owner.is_some()
    }

    pub fn get(&self) -> LockResult<&T> {
        match self.owner {
            // Valid accessor == the lock is held; shared access is safe.
            Some(owner) => Ok(unsafe { &*owner.value.get() }),
            None => Err(LockError::InvalidAccessor),
        }
    }

    pub fn get_mut(&mut self) -> LockResult<&mut T> {
        match self.owner {
            // The accessor is the sole handle while the lock is held.
            Some(owner) => Ok(unsafe { &mut *owner.value.get() }),
            None => Err(LockError::InvalidAccessor),
        }
    }

    /// Release the lock now instead of at end of scope.
    pub fn release(self) {}
}

impl<T> Deref for Accessor<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get()
            .unwrap_or_else(|_| panic!("accessor dereferenced without a bound lock"))
    }
}

impl<T> DerefMut for Accessor<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.get_mut()
            .unwrap_or_else(|_| panic!("accessor dereferenced without a bound lock"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_pickup_grants_access() {
        let sync = Synchronized::new(vec![1, 2, 3]);
        let mut accessor = sync.pickup(Timeout::Forever, None).unwrap();
        assert!(accessor.is_valid());
        accessor.get_mut().unwrap().push(4);
        assert_eq!(accessor.len(), 4);
    }

    #[test]
    fn test_pickup_excludes_concurrent_pickup() {
        let sync = Synchronized::new(0u32);
        let held = sync.pickup(Timeout::Forever, None).unwrap();
        assert_eq!(
            sync.pickup(Timeout::from_millis(50), None).map(|_| ()).unwrap_err(),
            LockError::Timeout
        );
        held.release();
        assert!(sync.pickup(Timeout::ZERO, None).is_ok());
    }

    #[test]
    fn test_try_pickup_yields_invalid_on_contention() {
        let sync = Synchronized::new(0u32);
        let held = sync.pickup(Timeout::Forever, None).unwrap();

        let loser = sync.try_pickup(10);
        assert!(!loser.is_valid());
        assert_eq!(loser.get().unwrap_err(), LockError::InvalidAccessor);
        drop(held);
    }

    #[test]
    fn test_try_pickup_works_with_borrowed_values() {
        let text = String::from("guarded");
        let sync = Synchronized::new(text.as_str());
        let held = sync.pickup(Timeout::Forever, None).unwrap();

        // Contended attempt on a non-'static value still yields the sentinel.
        let loser = sync.try_pickup(0);
        assert!(!loser.is_valid());
        drop(held);
        assert_eq!(*sync.try_pickup(0).get().unwrap(), "guarded");
    }

    #[test]
    fn test_shared_accessor_reads_from_other_threads() {
        let sync = Synchronized::new(41u64);
        let accessor = sync.pickup(Timeout::Forever, None).unwrap();

        thread::scope(|s| {
            let shared = &accessor;
            s.spawn(move || {
                assert_eq!(*shared.get().unwrap(), 41);
            });
        });
        assert_eq!(*accessor.get().unwrap(), 41);
    }

    #[test]
    fn test_null_accessor_is_invalid() {
        let accessor = Synchronized::<u32>::null_accessor();
        assert!(!accessor.is_valid());
        assert_eq!(accessor.get().unwrap_err(), LockError::InvalidAccessor);
    }

    #[test]
    #[should_panic(expected = "without a bound lock")]
    fn test_invalid_deref_panics() {
        let accessor = Synchronized::<u32>::null_accessor();
        let _ = *accessor;
    }

    #[test]
    fn test_cross_thread_mutation_is_serialized() {
        let sync = Arc::new(Synchronized::new(0u64));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sync = sync.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let mut accessor = sync.pickup(Timeout::Forever, None).unwrap();
                        *accessor += 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let accessor = sync.pickup(Timeout::from_millis(100), None).unwrap();
        assert_eq!(*accessor, 2000);
    }
}
