/*!
 * Lock Abstractions
 *
 * The `Lockable` capability and its move-only, kind-tagged `LockToken`;
 * a light user-mode mutual-exclusion lock that only touches a real wait
 * object under contention; an upgradable reader/writer lock implemented as
 * an explicit state machine; and `Synchronized<T>`, the accessor-gated
 * value wrapper.
 *
 * # Lock kinds
 *
 * Every token carries a [`LockKind`] chosen by its issuer; release
 * dispatches on the kind with an exhaustive match, so a token can never be
 * mis-released against state it does not describe.
 */

mod light;
mod synchronized;
mod token;
mod traits;
mod upgrade;

pub use light::LightLock;
pub use synchronized::{Accessor, Synchronized};
pub use token::LockToken;
pub use traits::{LockError, LockKind, LockResult, Lockable, LockableId, RawLockable};
pub use upgrade::UpgradeLock;
