/*!
 * State-Change Subscribers
 *
 * Per-state callback lists notified synchronously on every worker
 * transition, in registration order. Two scopes exist: an instance-local
 * registry owned by each worker, and a lazily-initialized process-global
 * registry shared by all workers. Registration hands back an RAII
 * [`Subscription`] that removes the callback on drop.
 */

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use super::state::WorkerState;

/// Process-unique worker identity, handed to callbacks.
pub type WorkerId = u64;

/// Callback invoked on a worker state transition
pub type StateCallback = Arc<dyn Fn(WorkerId, WorkerState) + Send + Sync + 'static>;

/// One per-state table of callbacks
#[derive(Default)]
pub(super) struct SubscriberRegistry {
    next_id: AtomicU64,
    lists: [RwLock<Vec<(u64, StateCallback)>>; WorkerState::COUNT],
}

impl SubscriberRegistry {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn add(&self, state: WorkerState, callback: StateCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lists[state.index()].write().push((id, callback));
        id
    }

    pub(super) fn remove(&self, state: WorkerState, id: u64) {
        self.lists[state.index()]
            .write()
            .retain(|(entry_id, _)| *entry_id != id);
    }

    /// Invoke every callback registered for `state`, in registration order.
    /// Callbacks run on the transitioning thread while no registry lock is
    /// held exclusively, so a callback may itself subscribe or unsubscribe.
    pub(super) fn notify(&self, worker: WorkerId, state: WorkerState) {
        let snapshot: Vec<StateCallback> = self.lists[state.index()]
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(worker, state);
        }
    }

    #[cfg(test)]
    pub(super) fn len(&self, state: WorkerState) -> usize {
        self.lists[state.index()].read().len()
    }
}

static GLOBAL_SUBSCRIBERS: OnceLock<Arc<SubscriberRegistry>> = OnceLock::new();

pub(super) fn global_registry() -> &'static Arc<SubscriberRegistry> {
    GLOBAL_SUBSCRIBERS.get_or_init(|| Arc::new(SubscriberRegistry::new()))
}

/// Register a process-global callback fired whenever *any* worker enters
/// `state`. Dropping the returned [`Subscription`] unregisters it.
pub fn subscribe_global(state: WorkerState, callback: StateCallback) -> Subscription {
    let registry = global_registry();
    let id = registry.add(state, callback);
    Subscription {
        registry: Arc::downgrade(registry),
        state,
        id,
    }
}

/// RAII handle for a registered state callback
///
/// Holds the registry weakly so a subscription outliving its worker is a
/// no-op at drop rather than a dangling removal.
pub struct Subscription {
    registry: Weak<SubscriberRegistry>,
    state: WorkerState,
    id: u64,
}

impl Subscription {
    pub(super) fn new(registry: &Arc<SubscriberRegistry>, state: WorkerState, id: u64) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            state,
            id,
        }
    }

    /// State this subscription listens for.
    pub fn state(&self) -> WorkerState {
        self.state
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.state, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("state", &self.state)
            .field("id", &self.id)
            .finish()
    }
}
