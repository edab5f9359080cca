/*!
 * Managed Worker Thread
 *
 * Owns one OS thread running a [`Runnable`], drives the lifecycle state
 * machine, fans out state-change notifications, captures the work body's
 * return payload or failure (including panics), and exposes a waitable
 * termination signal.
 *
 * # Architecture
 *
 * All mutable lifecycle data lives in a shared block referenced by both
 * the owning handle and the spawned thread. The OS thread is not created
 * until [`WorkerThread::start`], so a worker terminated straight from
 * `Constructed` never spawns at all.
 */

use log::{debug, warn};
use miette::Diagnostic;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;

use super::runnable::{Payload, Runnable, WorkerFailure};
use super::state::{StateCell, WorkerState};
use super::subscriber::{
    global_registry, StateCallback, SubscriberRegistry, Subscription, WorkerId,
};
use crate::core::{TimeBudget, Timeout};
use crate::waitable::{Event, WaitError, WaitResult, WaitStatus, Waitable};

#[cfg(unix)]
use nix::sys::pthread::Pthread;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Worker-layer errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic, Serialize, Deserialize)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum WorkerError {
    #[error("Worker operation timed out")]
    #[diagnostic(code(sync::worker::timeout))]
    Timeout,

    #[error("Worker was already started")]
    #[diagnostic(code(sync::worker::already_started))]
    AlreadyStarted,

    #[error("Operation {operation} invalid in state {state}")]
    #[diagnostic(code(sync::worker::invalid_state))]
    InvalidState {
        operation: String,
        state: WorkerState,
    },

    #[error("Failed to spawn worker thread: {0}")]
    #[diagnostic(code(sync::worker::spawn_failed))]
    SpawnFailed(String),

    #[error("Worker thread is not running")]
    #[diagnostic(code(sync::worker::not_running))]
    NotRunning,

    #[error("Not supported on this platform: {0}")]
    #[diagnostic(code(sync::worker::unsupported))]
    Unsupported(String),

    #[error("Wait error during worker operation: {0}")]
    #[diagnostic(transparent)]
    Wait(#[from] WaitError),
}

/// Result type for worker operations
pub type WorkerResult<T> = std::result::Result<T, WorkerError>;

struct WorkerShared {
    id: WorkerId,
    state: StateCell,
    input: Mutex<Option<Payload>>,
    output: Mutex<Option<Payload>>,
    failure: Mutex<Option<WorkerFailure>>,
    /// Manual-reset, set exactly once when the lifecycle reaches Terminated.
    finished: Event,
    subscribers: Arc<SubscriberRegistry>,
    #[cfg(unix)]
    os_thread: Mutex<Option<Pthread>>,
}

impl WorkerShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed),
            state: StateCell::new(),
            input: Mutex::new(None),
            output: Mutex::new(None),
            failure: Mutex::new(None),
            finished: Event::manual(),
            subscribers: Arc::new(SubscriberRegistry::new()),
            #[cfg(unix)]
            os_thread: Mutex::new(None),
        })
    }

    /// Fan out one transition: instance subscribers first, then globals.
    fn announce(&self, state: WorkerState) {
        debug!("worker {}: -> {}", self.id, state);
        self.subscribers.notify(self.id, state);
        global_registry().notify(self.id, state);
    }

    fn settle_terminated(&self) {
        self.announce(WorkerState::Terminated);
        self.finished.set();
    }
}

/// View of a worker handed to its [`Runnable`]
///
/// Cheap to clone; lets the work body observe its own identity and state
/// (in particular, poll for `Terminating` as its cancellation signal).
#[derive(Clone)]
pub struct WorkerHandle {
    shared: Arc<WorkerShared>,
}

impl WorkerHandle {
    pub fn id(&self) -> WorkerId {
        self.shared.id
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state.load()
    }

    /// True once external termination has been requested.
    pub fn is_stopping(&self) -> bool {
        matches!(
            self.state(),
            WorkerState::Terminating | WorkerState::Terminated
        )
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.shared.id)
            .field("state", &self.shared.state.load())
            .finish()
    }
}

/// A managed OS thread executing one [`Runnable`]
pub struct WorkerThread {
    shared: Arc<WorkerShared>,
    runnable: Arc<dyn Runnable>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerThread {
    /// Create a worker in `Constructed`; no thread exists yet.
    pub fn new(runnable: impl Runnable) -> Self {
        Self {
            shared: WorkerShared::new(),
            runnable: Arc::new(runnable),
            join: Mutex::new(None),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.shared.id
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state.load()
    }

    /// Handle suitable for passing into callbacks or the work body.
    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Register an instance-local callback for `state` transitions of this
    /// worker. Dropping the subscription unregisters it.
    pub fn subscribe(&self, state: WorkerState, callback: StateCallback) -> Subscription {
        let id = self.shared.subscribers.add(state, callback);
        Subscription::new(&self.shared.subscribers, state, id)
    }

    /// Spawn the OS thread and run the work body with `input`.
    ///
    /// Fails with [`WorkerError::AlreadyStarted`] on a second call or after
    /// termination; the `Constructed -> Initializing` transition decides the
    /// race, so exactly one concurrent starter wins.
    pub fn start(&self, input: Option<Payload>) -> WorkerResult<()> {
        if !self
            .shared
            .state
            .transition(WorkerState::Constructed, WorkerState::Initializing)
        {
            return Err(WorkerError::AlreadyStarted);
        }
        self.shared.announce(WorkerState::Initializing);
        *self.shared.input.lock() = input;

        let shared = Arc::clone(&self.shared);
        let runnable = Arc::clone(&self.runnable);
        match std::thread::Builder::new()
            .name(format!("worker-{}", self.shared.id))
            .spawn(move || run_body(shared, runnable))
        {
            Ok(handle) => {
                *self.join.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.settle_spawn_failure();
                Err(WorkerError::SpawnFailed(e.to_string()))
            }
        }
    }

    /// No thread exists after a failed spawn; settle terminal state here so
    /// waiters and terminators never park on a worker that cannot run.
    fn settle_spawn_failure(&self) {
        self.shared.input.lock().take();
        self.shared
            .state
            .transition(WorkerState::Initializing, WorkerState::Terminated);
        self.shared.settle_terminated();
    }

    /// Request termination. Idempotent; never blocks on the work body.
    ///
    /// From `Constructed` the worker jumps through `Terminating` to
    /// `Terminated` without ever spawning. From `Running` the runnable's
    /// `stop_notify` is invoked on the calling thread and the body is left
    /// to observe `Terminating` and return. During the brief `Initializing`
    /// window the caller yields until the spawn settles.
    pub fn signal_terminate(&self) -> WorkerResult<()> {
        loop {
            match self.shared.state.load() {
                WorkerState::Constructed => {
                    if self
                        .shared
                        .state
                        .transition(WorkerState::Constructed, WorkerState::Terminating)
                    {
                        self.shared.announce(WorkerState::Terminating);
                        self.shared
                            .state
                            .transition(WorkerState::Terminating, WorkerState::Terminated);
                        self.shared.settle_terminated();
                        return Ok(());
                    }
                }
                WorkerState::Initializing => std::thread::yield_now(),
                WorkerState::Running => {
                    if self
                        .shared
                        .state
                        .transition(WorkerState::Running, WorkerState::Terminating)
                    {
                        self.shared.announce(WorkerState::Terminating);
                        self.runnable.stop_notify(&self.handle());
                        return Ok(());
                    }
                }
                WorkerState::Terminating | WorkerState::Terminated => return Ok(()),
            }
        }
    }

    /// Take the payload the work body returned. Only valid once terminated.
    pub fn return_data(&self) -> WorkerResult<Option<Payload>> {
        let state = self.shared.state.load();
        if !state.is_terminal() {
            return Err(WorkerError::InvalidState {
                operation: "return_data".to_string(),
                state,
            });
        }
        Ok(self.shared.output.lock().take())
    }

    /// Take the captured failure (explicit or panic), if any. Only valid
    /// once terminated.
    pub fn take_fatal_failure(&self) -> WorkerResult<Option<WorkerFailure>> {
        let state = self.shared.state.load();
        if !state.is_terminal() {
            return Err(WorkerError::InvalidState {
                operation: "take_fatal_failure".to_string(),
                state,
            });
        }
        Ok(self.shared.failure.lock().take())
    }

    /// Interrupt a blocking system call on the worker's thread by
    /// delivering a no-op signal, so `EINTR` unblocks it. Best-effort; the
    /// work body still decides to exit by observing `Terminating`.
    #[cfg(unix)]
    pub fn abort_io(&self) -> WorkerResult<()> {
        use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
        use std::sync::OnceLock;

        static HANDLER_INSTALLED: OnceLock<Result<(), String>> = OnceLock::new();

        extern "C" fn noop_handler(_signum: i32) {}

        let installed = HANDLER_INSTALLED.get_or_init(|| {
            let action = SigAction::new(
                SigHandler::Handler(noop_handler),
                SaFlags::empty(),
                SigSet::empty(),
            );
            // Replacing the disposition is process-wide; SIGUSR1 is reserved
            // for this purpose.
            unsafe { sigaction(Signal::SIGUSR1, &action) }
                .map(|_| ())
                .map_err(|e| e.to_string())
        });
        if let Err(msg) = installed {
            return Err(WorkerError::Unsupported(format!(
                "cannot install abort signal handler: {}",
                msg
            )));
        }

        let target = match *self.shared.os_thread.lock() {
            Some(thread) => thread,
            None => return Err(WorkerError::NotRunning),
        };
        if self.shared.state.load().is_terminal() {
            return Err(WorkerError::NotRunning);
        }
        nix::sys::pthread::pthread_kill(target, Signal::SIGUSR1).map_err(|e| {
            WorkerError::Wait(WaitError::Os {
                code: e as i32,
                message: e.desc().to_string(),
            })
        })
    }

    #[cfg(not(unix))]
    pub fn abort_io(&self) -> WorkerResult<()> {
        Err(WorkerError::Unsupported(
            "blocking-IO abort requires pthread signals".to_string(),
        ))
    }

    /// Fire-and-forget: start a worker whose handle is immediately
    /// discarded. The thread is detached and tears itself down when the
    /// work body returns; the payload and any failure are discarded with it.
    pub fn spawn_detached(
        runnable: impl Runnable,
        input: Option<Payload>,
    ) -> WorkerResult<WorkerId> {
        let worker = WorkerThread::new(runnable);
        worker.start(input)?;
        let id = worker.id();
        // Taking the join handle out detaches the OS thread; Drop then has
        // nothing to terminate or join.
        drop(worker.join.lock().take());
        Ok(id)
    }
}

impl Waitable for WorkerThread {
    /// Wait for the worker to reach `Terminated`. Signaled immediately if
    /// it already has (including the never-started fast path).
    fn wait_for(&self, timeout: Timeout) -> WaitResult<WaitStatus> {
        let budget = TimeBudget::start(timeout);
        // Initializing is transient and must not be parked on.
        while self.shared.state.load() == WorkerState::Initializing {
            if budget.expired() {
                return Ok(WaitStatus::TimedOut);
            }
            std::thread::yield_now();
        }
        self.shared.finished.wait_for(budget.remaining())
    }

    fn try_wait(&self) -> WaitResult<WaitStatus> {
        self.shared.finished.try_wait()
    }

    fn ready_hint(&self) -> bool {
        self.shared.finished.is_set()
    }
}

impl Drop for WorkerThread {
    /// A live worker is terminated and joined; leaking a running thread
    /// past its owner is always a bug upstream, so it is logged. Detached
    /// workers carry no join handle and are left alone.
    fn drop(&mut self) {
        let handle = self.join.lock().take();
        let Some(handle) = handle else { return };
        let state = self.shared.state.load();
        if !state.is_terminal() {
            warn!(
                "worker {}: dropped while {}, forcing termination",
                self.shared.id, state
            );
            let _ = self.signal_terminate();
        }
        let _ = handle.join();
    }
}

impl std::fmt::Debug for WorkerThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerThread")
            .field("id", &self.shared.id)
            .field("state", &self.shared.state.load())
            .finish()
    }
}

/// Body executed on the spawned thread.
fn run_body(shared: Arc<WorkerShared>, runnable: Arc<dyn Runnable>) {
    #[cfg(unix)]
    {
        *shared.os_thread.lock() = Some(nix::sys::pthread::pthread_self());
    }

    // A terminator may have raced us past Initializing; only announce
    // Running if we actually got there.
    if shared
        .state
        .transition(WorkerState::Initializing, WorkerState::Running)
    {
        shared.announce(WorkerState::Running);
    }

    let input = shared.input.lock().take();
    let handle = WorkerHandle {
        shared: Arc::clone(&shared),
    };
    let outcome = catch_unwind(AssertUnwindSafe(|| runnable.run(&handle, input)));
    match outcome {
        Ok(Ok(data)) => *shared.output.lock() = data,
        Ok(Err(failure)) => *shared.failure.lock() = Some(failure),
        Err(panic) => {
            let failure = WorkerFailure::from_panic(panic);
            warn!("worker {}: work body panicked: {}", shared.id, failure.message);
            *shared.failure.lock() = Some(failure);
        }
    }

    if !shared
        .state
        .transition(WorkerState::Running, WorkerState::Terminated)
    {
        let _ = shared
            .state
            .transition(WorkerState::Terminating, WorkerState::Terminated);
    }
    shared.settle_terminated();
}
