/*!
 * Worker Thread Lifecycle
 *
 * Wraps one unit of user work (a [`Runnable`]) in a managed OS thread with
 * an explicit state machine on a single atomic field, synchronous
 * per-state subscriber fan-out (instance-local, then process-global),
 * captured return payload or failure, cooperative cancellation, and a
 * best-effort blocking-IO abort escape hatch.
 *
 * # Lifecycle
 *
 * `Constructed → Initializing → Running → Terminated`, with `Terminating`
 * entered on an external termination request (from `Running`, or straight
 * from `Constructed` without ever running the work). All transitions are
 * compare-and-swap; racing starters/terminators observe one consistent
 * total order.
 */

mod runnable;
mod state;
mod subscriber;
mod thread;

pub use runnable::{Payload, Runnable, WorkResult, WorkerFailure};
pub use state::{StateCell, WorkerState};
pub use subscriber::{subscribe_global, StateCallback, Subscription, WorkerId};
pub use thread::{WorkerError, WorkerHandle, WorkerResult, WorkerThread};
