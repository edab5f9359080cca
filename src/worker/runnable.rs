/*!
 * Runnable Work Contract
 *
 * The trait a worker thread executes, plus the opaque payload type used to
 * hand data in at start and back out at termination.
 */

use serde::{Deserialize, Serialize};
use std::any::Any;
use thiserror::Error;

use super::thread::WorkerHandle;

/// Opaque data handed into a worker at start and returned at termination
///
/// Callers downcast on the way out; the worker machinery never inspects it.
pub type Payload = Box<dyn Any + Send>;

/// Failure captured from a work body, either returned explicitly or
/// recovered from a panic.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("worker failed: {message}")]
pub struct WorkerFailure {
    pub message: String,
}

impl WorkerFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build a failure from a caught panic payload.
    pub(super) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        Self { message }
    }
}

/// Result of one work body execution
pub type WorkResult = Result<Option<Payload>, WorkerFailure>;

/// A unit of work executed on a managed worker thread
///
/// Both methods are mandatory. `run` executes once on the worker's own
/// thread; `stop_notify` is invoked on the *requester's* thread when
/// termination is signaled while the work is running, and must only nudge
/// the work body toward exit (set a flag, signal an event) rather than
/// block.
pub trait Runnable: Send + Sync + 'static {
    /// Execute the work. The returned payload (if any) is held by the
    /// worker until collected after termination.
    fn run(&self, worker: &WorkerHandle, input: Option<Payload>) -> WorkResult;

    /// Called when external termination is requested mid-run.
    fn stop_notify(&self, worker: &WorkerHandle);
}
