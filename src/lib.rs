/*!
 * sync-core
 *
 * Thread-level synchronization runtime: waitable signaling objects, generic
 * lock abstractions with move-only tokens, a synchronized-value accessor, a
 * blocking double-ended queue with a nested iterator lock, and a managed
 * worker-thread lifecycle.
 *
 * # Architecture
 *
 * Leaf to root:
 * - `waitable`: uniform bounded-timeout wait contract (events, semaphores,
 *   delays, alarm clocks, composite waits)
 * - `lock`: the `Lockable` capability, tagged `LockToken`, a light
 *   user-mode mutex, an upgradable reader/writer lock, and `Synchronized<T>`
 * - `deque`: gated blocking deque with shared/exclusive iteration
 * - `worker`: managed OS-thread lifecycle with state subscriptions
 *
 * Every blocking entry point takes a [`Timeout`] budget and optionally an
 * external abort [`Waitable`]; no documented entry point can hang without a
 * diagnostic.
 */

pub mod core;
pub mod deque;
pub mod lock;
pub mod waitable;
pub mod worker;

// Re-exports
pub use crate::core::{SyncError, SyncResult, TimeBudget, Timeout};
pub use deque::{BlockingDeque, DequeError, DequeReadGuard, DequeWriteGuard};
pub use lock::{Accessor, LightLock, LockError, LockKind, LockToken, Lockable, Synchronized, UpgradeLock};
pub use waitable::{AlarmClock, Event, FixedDelay, Semaphore, WaitError, WaitStatus, Waitable, WaitableAlarm};
pub use worker::{Payload, Runnable, WorkerError, WorkerState, WorkerThread};
