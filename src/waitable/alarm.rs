/*!
 * Alarm Clock
 *
 * Arms against an absolute deadline or relative duration and invokes a
 * callback when due. A dedicated runner thread sleeps in bounded chunks,
 * re-checking the deadline and any pending command on every wake, so a far
 * deadline never turns into one oversized wait. `fire` forces immediate
 * triggering; `disarm` cancels without the callback.
 *
 * [`WaitableAlarm`] adapts the clock into a plain [`Waitable`] so it can be
 * mixed into composite waits, latching the fired-vs-disarmed distinction
 * into its wait status.
 */

use super::event::Event;
use super::traits::{WaitError, WaitResult, WaitStatus, Waitable};
use crate::core::Timeout;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Upper bound on a single runner sleep; the deadline and pending commands
/// are re-checked at least this often.
const MAX_SLEEP_CHUNK: Duration = Duration::from_millis(100);

/// Callback invoked when the alarm comes due or is force-fired.
pub type AlarmCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunnerCommand {
    Fire,
    Disarm,
}

struct RunnerShared {
    command: Mutex<Option<RunnerCommand>>,
    condvar: Condvar,
}

/// One-shot alarm clock with a dedicated runner thread.
pub struct AlarmClock {
    shared: Mutex<Option<Arc<RunnerShared>>>,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl AlarmClock {
    /// New, unarmed clock.
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(None),
            runner: Mutex::new(None),
        }
    }

    /// Arm against an absolute deadline. A deadline already in the past
    /// fires promptly.
    pub fn arm_at(&self, deadline: Instant, callback: AlarmCallback) -> WaitResult<()> {
        let mut shared_slot = self.shared.lock();
        let mut runner_slot = self.runner.lock();

        // A finished runner can be reaped and re-armed over.
        if let Some(handle) = runner_slot.as_ref() {
            if handle.is_finished() {
                let _ = runner_slot.take().map(JoinHandle::join);
                *shared_slot = None;
            } else {
                return Err(WaitError::AlreadyArmed);
            }
        }

        let shared = Arc::new(RunnerShared {
            command: Mutex::new(None),
            condvar: Condvar::new(),
        });
        let runner_shared = shared.clone();

        let handle = thread::spawn(move || {
            let command = loop {
                let mut cmd = runner_shared.command.lock();
                if let Some(c) = cmd.take() {
                    break c;
                }
                let now = Instant::now();
                if now >= deadline {
                    break RunnerCommand::Fire;
                }
                let chunk = (deadline - now).min(MAX_SLEEP_CHUNK);
                runner_shared.condvar.wait_for(&mut cmd, chunk);
            };

            match command {
                RunnerCommand::Fire => {
                    debug!("alarm runner firing");
                    callback();
                }
                RunnerCommand::Disarm => {
                    debug!("alarm runner disarmed");
                }
            }
        });

        *shared_slot = Some(shared);
        *runner_slot = Some(handle);
        Ok(())
    }

    /// Arm against a relative duration.
    pub fn arm_in(&self, delay: Duration, callback: AlarmCallback) -> WaitResult<()> {
        self.arm_at(Instant::now() + delay, callback)
    }

    /// Force immediate triggering: the callback runs on the runner thread.
    ///
    /// Returns true if the clock was armed. With `wait` set, blocks until
    /// the runner (including the callback) has finished.
    pub fn fire(&self, wait: bool) -> bool {
        self.send(RunnerCommand::Fire, wait)
    }

    /// Cancel without invoking the callback.
    ///
    /// Returns true if the clock was armed. With `wait` set, blocks until
    /// the runner has exited.
    pub fn disarm(&self, wait: bool) -> bool {
        self.send(RunnerCommand::Disarm, wait)
    }

    /// True while a runner thread is live.
    pub fn is_armed(&self) -> bool {
        self.runner
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    fn send(&self, command: RunnerCommand, wait: bool) -> bool {
        let shared = match self.shared.lock().clone() {
            Some(s) => s,
            None => return false,
        };

        {
            let mut cmd = shared.command.lock();
            // First command wins; a racing fire/disarm is not overridden.
            if cmd.is_none() {
                *cmd = Some(command);
            }
            shared.condvar.notify_one();
        }

        if wait {
            if let Some(handle) = self.runner.lock().take() {
                if handle.join().is_err() {
                    warn!("alarm runner panicked during {:?}", command);
                }
                *self.shared.lock() = None;
            }
        }
        true
    }
}

impl Default for AlarmClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AlarmClock {
    fn drop(&mut self) {
        if self.is_armed() {
            debug!("alarm clock dropped while armed; disarming");
            self.disarm(true);
        } else if let Some(handle) = self.runner.get_mut().take() {
            let _ = handle.join();
        }
    }
}

/// What a [`WaitableAlarm`] latched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlarmOutcome {
    Fired,
    Disarmed,
}

struct AlarmLatch {
    done: Event,
    outcome: Mutex<Option<AlarmOutcome>>,
}

impl AlarmLatch {
    fn settle(&self, outcome: AlarmOutcome) {
        let mut slot = self.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.done.set();
    }
}

/// Alarm clock adapted into a plain [`Waitable`].
///
/// Waiting resolves to `Signaled` once the alarm fired and `Aborted` once it
/// was disarmed; the distinction is latched, so late waiters observe the
/// same answer.
pub struct WaitableAlarm {
    clock: AlarmClock,
    latch: Arc<AlarmLatch>,
}

impl WaitableAlarm {
    pub fn new() -> Self {
        Self {
            clock: AlarmClock::new(),
            latch: Arc::new(AlarmLatch {
                done: Event::manual(),
                outcome: Mutex::new(None),
            }),
        }
    }

    pub fn arm_at(&self, deadline: Instant) -> WaitResult<()> {
        let latch = self.latch.clone();
        self.clock
            .arm_at(deadline, Box::new(move || latch.settle(AlarmOutcome::Fired)))
    }

    pub fn arm_in(&self, delay: Duration) -> WaitResult<()> {
        self.arm_at(Instant::now() + delay)
    }

    pub fn fire(&self, wait: bool) -> bool {
        self.clock.fire(wait)
    }

    pub fn disarm(&self, wait: bool) -> bool {
        let was_armed = self.clock.disarm(wait);
        if was_armed {
            self.latch.settle(AlarmOutcome::Disarmed);
        }
        was_armed
    }

    pub fn is_armed(&self) -> bool {
        self.clock.is_armed()
    }
}

impl Default for WaitableAlarm {
    fn default() -> Self {
        Self::new()
    }
}

impl Waitable for WaitableAlarm {
    fn wait_for(&self, timeout: Timeout) -> WaitResult<WaitStatus> {
        match self.latch.done.wait_for(timeout)? {
            WaitStatus::Signaled => Ok(match *self.latch.outcome.lock() {
                Some(AlarmOutcome::Fired) | None => WaitStatus::Signaled,
                Some(AlarmOutcome::Disarmed) => WaitStatus::Aborted,
            }),
            other => Ok(other),
        }
    }

    fn ready_hint(&self) -> bool {
        self.latch.done.is_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_alarm_fires_at_deadline() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let clock = AlarmClock::new();

        clock
            .arm_in(
                Duration::from_millis(30),
                Box::new(move || {
                    fired_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!clock.is_armed());
    }

    #[test]
    fn test_disarm_suppresses_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let clock = AlarmClock::new();

        clock
            .arm_in(
                Duration::from_secs(60),
                Box::new(move || {
                    fired_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(clock.disarm(true));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!clock.is_armed());
    }

    #[test]
    fn test_fire_forces_callback_early() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let clock = AlarmClock::new();

        clock
            .arm_in(
                Duration::from_secs(60),
                Box::new(move || {
                    fired_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(clock.fire(true));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_double_arm_rejected() {
        let clock = AlarmClock::new();
        clock.arm_in(Duration::from_secs(60), Box::new(|| {})).unwrap();
        let err = clock.arm_in(Duration::from_secs(60), Box::new(|| {})).unwrap_err();
        assert_eq!(err, WaitError::AlreadyArmed);
        clock.disarm(true);
    }

    #[test]
    fn test_rearm_after_completion() {
        let clock = AlarmClock::new();
        clock.arm_in(Duration::from_millis(10), Box::new(|| {})).unwrap();
        thread::sleep(Duration::from_millis(100));
        // Previous runner finished; arming again must succeed.
        clock.arm_in(Duration::from_secs(60), Box::new(|| {})).unwrap();
        clock.disarm(true);
    }

    #[test]
    fn test_waitable_alarm_latches_fired() {
        let alarm = WaitableAlarm::new();
        alarm.arm_in(Duration::from_millis(20)).unwrap();

        let status = alarm.wait_for(Timeout::from_millis(1000)).unwrap();
        assert_eq!(status, WaitStatus::Signaled);
        // Latched: a second wait sees the same answer immediately.
        assert_eq!(alarm.wait_for(Timeout::ZERO).unwrap(), WaitStatus::Signaled);
    }

    #[test]
    fn test_waitable_alarm_latches_disarmed() {
        let alarm = WaitableAlarm::new();
        alarm.arm_in(Duration::from_secs(60)).unwrap();
        alarm.disarm(true);

        let status = alarm.wait_for(Timeout::from_millis(1000)).unwrap();
        assert_eq!(status, WaitStatus::Aborted);
    }

    #[test]
    fn test_unarmed_fire_and_disarm_are_noops() {
        let clock = AlarmClock::new();
        assert!(!clock.fire(true));
        assert!(!clock.disarm(true));
    }
}
