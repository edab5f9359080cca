/*!
 * Worker State Machine
 *
 * Lifecycle states packed into one `AtomicU8` so every transition is a
 * single compare-and-swap with no lock on the hot path.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum WorkerState {
    /// Created but not yet started
    Constructed = 0,
    /// Start requested, OS thread not yet executing the work body
    Initializing = 1,
    /// Work body executing
    Running = 2,
    /// Termination requested, work body winding down
    Terminating = 3,
    /// Work body finished (or never ran); terminal
    Terminated = 4,
}

impl WorkerState {
    /// Number of distinct states, for per-state subscriber tables.
    pub const COUNT: usize = 5;

    /// Dense index for table lookups.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// True for the terminal state.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Terminated)
    }

    fn from_u8(raw: u8) -> WorkerState {
        match raw {
            0 => WorkerState::Constructed,
            1 => WorkerState::Initializing,
            2 => WorkerState::Running,
            3 => WorkerState::Terminating,
            _ => WorkerState::Terminated,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Constructed => "constructed",
            WorkerState::Initializing => "initializing",
            WorkerState::Running => "running",
            WorkerState::Terminating => "terminating",
            WorkerState::Terminated => "terminated",
        };
        write!(f, "{}", name)
    }
}

/// Atomic cell holding a [`WorkerState`]
///
/// All mutation goes through [`StateCell::transition`], so observers never
/// see a state the machine did not pass through.
#[derive(Debug)]
pub struct StateCell {
    raw: AtomicU8,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            raw: AtomicU8::new(WorkerState::Constructed as u8),
        }
    }

    /// Current state
    #[inline]
    pub fn load(&self) -> WorkerState {
        WorkerState::from_u8(self.raw.load(Ordering::Acquire))
    }

    /// Compare-and-swap transition; returns false if the current state was
    /// not `from` (some other actor won the race).
    #[inline]
    pub fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.raw
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
