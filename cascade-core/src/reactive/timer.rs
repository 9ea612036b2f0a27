//! Host Timers
//!
//! Throttled evaluation needs a way to run a callback later. The host owns
//! the event loop, so the engine only sees the `TimerHost` trait.
//!
//! Two hosts ship with the crate:
//!
//! - `TokioTimer` spawns onto the current tokio `LocalSet` and sleeps with
//!   `tokio::time::sleep`. Callbacks run on the local task, never on another
//!   thread.
//! - `ManualTimer` is a virtual clock. Nothing fires until `advance` is
//!   called, which makes it suitable for hosts with their own frame loop.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Callback scheduled on a timer host.
pub type TimerCallback = Box<dyn FnOnce()>;

/// A facility that runs callbacks after a delay.
pub trait TimerHost {
    /// Run `callback` once `delay` has elapsed.
    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}

/// Handle to a scheduled callback.
///
/// Dropping the handle cancels the callback if it has not fired yet. Use
/// [`detach`](TimerHandle::detach) to let it run regardless.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl TimerHandle {
    /// Create a handle that runs `cancel` when cancelled.
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancel the callback. A no-op once it has fired.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    /// Forget the handle without cancelling.
    pub fn detach(mut self) {
        self.cancel = None;
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tokio
// ----------------------------------------------------------------------------

/// Timer host backed by the tokio runtime.
///
/// # Panics
///
/// `set_timeout` panics when called outside a `tokio::task::LocalSet`,
/// because callbacks capture `!Send` state.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

impl TimerHost for TokioTimer {
    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let task = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        TimerHandle::new(move || task.abort())
    }
}

// ----------------------------------------------------------------------------
// Manual clock
// ----------------------------------------------------------------------------

type Deadline = (Duration, u64);

struct ManualClock {
    now: Cell<Duration>,
    next_seq: Cell<u64>,
    queue: RefCell<BTreeMap<Deadline, TimerCallback>>,
}

/// Deterministic timer host driven by explicit calls to [`advance`].
///
/// Clones share one clock.
///
/// [`advance`]: ManualTimer::advance
#[derive(Clone)]
pub struct ManualTimer {
    clock: Rc<ManualClock>,
}

impl ManualTimer {
    /// Create a clock at time zero with nothing scheduled.
    pub fn new() -> Self {
        Self {
            clock: Rc::new(ManualClock {
                now: Cell::new(Duration::ZERO),
                next_seq: Cell::new(0),
                queue: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    /// Time elapsed on this clock.
    pub fn now(&self) -> Duration {
        self.clock.now.get()
    }

    /// Number of callbacks waiting to fire.
    pub fn pending(&self) -> usize {
        self.clock.queue.borrow().len()
    }

    /// Move the clock forward by `by`, firing every callback that falls due
    /// in deadline order. Callbacks scheduled while advancing fire too if
    /// their deadline is within the window.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;

        loop {
            let due = {
                let mut queue = self.clock.queue.borrow_mut();
                match queue.first_key_value() {
                    Some((&(deadline, _), _)) if deadline <= target => queue.pop_first(),
                    _ => None,
                }
            };

            let Some(((deadline, _), callback)) = due else {
                break;
            };
            self.clock.now.set(deadline);
            callback();
        }

        self.clock.now.set(target);
    }
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerHost for ManualTimer {
    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let seq = self.clock.next_seq.get();
        self.clock.next_seq.set(seq + 1);

        let key = (self.now() + delay, seq);
        self.clock.queue.borrow_mut().insert(key, callback);

        let clock: Weak<ManualClock> = Rc::downgrade(&self.clock);
        TimerHandle::new(move || {
            if let Some(clock) = clock.upgrade() {
                // Bind first so the queue borrow ends before the callback drops.
                let removed = clock.queue.borrow_mut().remove(&key);
                drop(removed);
            }
        })
    }
}

impl fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTimer")
            .field("now", &self.now())
            .field("pending", &self.pending())
            .finish()
    }
}
