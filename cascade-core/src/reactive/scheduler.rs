//! Evaluation Scheduler
//!
//! Decides when a computed re-evaluates after an upstream change:
//!
//! 1. A positive throttle with a timer host wins: the pending timer (if any)
//!    is cancelled and a new one started, so only the last change in a
//!    window evaluates. Without a host the throttle is inert.
//! 2. Otherwise an installed deferred-evaluation hook takes over timing.
//! 3. Otherwise evaluation is synchronous.
//!
//! The scheduler owns the node's single outstanding throttle timer.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use super::options::DeferredFn;
use super::timer::{TimerHandle, TimerHost};

/// What to do with one upstream change.
pub(crate) enum Schedule<T: 'static> {
    /// Debounce by this delay on this host.
    Throttle(Duration, Rc<dyn TimerHost>),
    /// Mark stale and let the hook decide.
    Deferred(DeferredFn<T>),
    /// Evaluate now.
    Immediate,
}

pub(crate) struct EvaluationScheduler<T: 'static> {
    throttle: Option<Duration>,
    timer: Option<Rc<dyn TimerHost>>,
    deferred: Option<DeferredFn<T>>,
    pending: Option<TimerHandle>,
}

impl<T: 'static> EvaluationScheduler<T> {
    pub(crate) fn new(
        throttle: Option<Duration>,
        timer: Option<Rc<dyn TimerHost>>,
        deferred: Option<DeferredFn<T>>,
    ) -> Self {
        Self {
            throttle,
            timer,
            deferred,
            pending: None,
        }
    }

    pub(crate) fn decide(&self) -> Schedule<T> {
        match (self.throttle(), &self.timer, &self.deferred) {
            (Some(delay), Some(timer), _) => Schedule::Throttle(delay, Rc::clone(timer)),
            (_, _, Some(hook)) => Schedule::Deferred(Rc::clone(hook)),
            _ => Schedule::Immediate,
        }
    }

    pub(crate) fn set_throttle(&mut self, throttle: Option<Duration>) {
        self.throttle = throttle;
    }

    pub(crate) fn throttle(&self) -> Option<Duration> {
        self.throttle.filter(|delay| !delay.is_zero())
    }

    pub(crate) fn set_deferred(&mut self, deferred: Option<DeferredFn<T>>) {
        self.deferred = deferred;
    }

    pub(crate) fn deferred(&self) -> Option<DeferredFn<T>> {
        self.deferred.clone()
    }

    pub(crate) fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Store the outstanding timer. The caller has already taken and
    /// cancelled any previous one.
    pub(crate) fn set_pending(&mut self, handle: TimerHandle) {
        debug_assert!(self.pending.is_none(), "throttle timer replaced without cancel");
        self.pending = Some(handle);
    }

    pub(crate) fn take_pending(&mut self) -> Option<TimerHandle> {
        self.pending.take()
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<T: 'static> fmt::Debug for EvaluationScheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationScheduler")
            .field("throttle", &self.throttle)
            .field("has_timer", &self.timer.is_some())
            .field("has_deferred", &self.deferred.is_some())
            .field("pending", &self.pending.is_some())
            .finish()
    }
}
