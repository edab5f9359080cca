/*!
 * Core Utilities
 *
 * Shared building blocks for the synchronization runtime: the unified error
 * type, the timeout/budget bookkeeping used by every multi-stage wait, and
 * the adaptive spin backoff helper.
 */

mod backoff;
mod errors;
mod timeout;

pub use backoff::Backoff;
pub use errors::{SerializableError, SyncError, SyncResult};
pub use timeout::{TimeBudget, Timeout};
