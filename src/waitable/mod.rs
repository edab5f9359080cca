/*!
 * Waitable Primitives
 *
 * Kernel-object stand-ins with a uniform "wait up to timeout" contract:
 * manual/auto-reset events, a bounded counting semaphore, a fixed-delay
 * waitable, an alarm clock with a dedicated runner thread, and composite
 * waits over sets of waitables.
 *
 * # Architecture
 *
 * Everything blocking in this crate bottoms out in [`Event`], which is
 * built on `parking_lot::Mutex` + `Condvar`. Composite waits
 * ([`wait_any`], [`wait_all`], [`wait_with_abort`]) compose arbitrary
 * `&dyn Waitable` objects; since condvar-backed objects cannot be natively
 * multiplexed, `wait_any` polls under an adaptive backoff.
 */

mod alarm;
mod delay;
mod event;
mod multi;
mod semaphore;
mod traits;

pub use alarm::{AlarmClock, WaitableAlarm};
pub use delay::FixedDelay;
pub use event::{Event, ResetMode};
pub use multi::{wait_all, wait_any, wait_with_abort};
pub use semaphore::Semaphore;
pub use traits::{WaitError, WaitResult, WaitStatus, Waitable};
