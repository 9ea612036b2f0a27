//! Computed Implementation
//!
//! A Computed is a cached derived value whose dependencies are discovered
//! while its read function runs.
//!
//! # How Computeds Work
//!
//! 1. On construction (unless deferred) the node evaluates: it opens a
//!    detection scope, runs the read function, and subscribes to every
//!    observable or computed read along the way.
//!
//! 2. Reads return the cached value until a dependency publishes a change.
//!
//! 3. A change notification goes through the scheduler, which evaluates
//!    now, after a throttle window, or when a deferred hook says so.
//!
//! 4. Each evaluation reconciles dependencies: records still in use are kept
//!    as-is, new ones are subscribed, and those no longer read are disposed.
//!
//! 5. An evaluation that ends with no dependencies disposes the node. It can
//!    never change again, so there is nothing left to listen to.
//!
//! # Re-entrancy
//!
//! No `RefCell` borrow is held while user code runs. A read function whose
//! side effects trigger its own re-evaluation hits the `is_being_evaluated`
//! guard and the nested attempt is dropped.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use super::context::{DependencyCollector, DependencyDetection, DetectionScope};
use super::dependency::DependencyRecord;
use super::options::{ComputedOptions, DeferredFn, EqualityFn, ReadFn, WriteFn};
use super::scheduler::{EvaluationScheduler, Schedule};
use super::subscribable::{Event, Subscribable, Trackable};
use super::subscriber::{SubscribableId, Subscription, SubscriptionId};
use super::timer::TimerHost;
use crate::error::{ComputedError, Result};

/// Observable lifecycle state of a computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// Never evaluated; the first read or peek will run the read function.
    Deferred,

    /// The cached value may be out of date.
    Stale,

    /// A throttled evaluation is scheduled.
    Pending,

    /// The read function is running.
    Evaluating,

    /// The cached value reflects the current dependencies.
    Fresh,

    /// Terminal. The read function will not run again.
    Disposed,
}

/// A derived value with dynamically discovered dependencies.
///
/// # Example
///
/// ```rust
/// use cascade_core::reactive::{Computed, Observable};
///
/// let a = Observable::new(1);
/// let b = Observable::new(2);
/// let sum = Computed::new({
///     let (a, b) = (a.clone(), b.clone());
///     move || a.get() + b.get()
/// });
///
/// assert_eq!(sum.get(), 3);
/// a.set(5);
/// assert_eq!(sum.get(), 7);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T: 'static> {
    id: SubscribableId,
    state: RefCell<NodeState<T>>,
    write: Option<WriteFn<T>>,
    equality: EqualityFn<T>,
    subscribable: Subscribable<T>,
    scheduler: RefCell<EvaluationScheduler<T>>,
}

/// Private per-node state. Mutated only by evaluation and disposal.
struct NodeState<T> {
    latest_value: Option<T>,
    is_stale: bool,
    is_being_evaluated: bool,
    is_disposed: bool,
    read: Option<ReadFn<T>>,
    dependency_tracking: IndexMap<SubscribableId, DependencyRecord>,
    dependencies_count: usize,
}

impl<T> Computed<T>
where
    T: Clone + 'static,
{
    /// Create a computed from an infallible read function and evaluate it.
    pub fn new<F>(read: F) -> Self
    where
        T: PartialEq,
        F: Fn() -> T + 'static,
    {
        let computed = Self::assemble(ComputedOptions::new(), Rc::new(move || Ok(read())));
        computed.inner.evaluate_logged(false);
        computed
    }

    /// Create a computed from options.
    ///
    /// Fails with [`ComputedError::InvalidConfiguration`] when no read
    /// function was given or a throttle was set without a timer host, and
    /// with the read function's error when the eager first evaluation fails.
    pub fn with_options(mut options: ComputedOptions<T>) -> Result<Self> {
        let read = options.read.take().ok_or(ComputedError::InvalidConfiguration(
            "pass a function that returns the value of the computed",
        ))?;
        let throttled = options
            .evaluation
            .throttle_evaluation
            .is_some_and(|delay| !delay.is_zero());
        if throttled && options.timer.is_none() {
            return Err(ComputedError::InvalidConfiguration(
                "throttled evaluation needs a timer host; pass one with `timer`",
            ));
        }
        let defer = options.evaluation.defer_evaluation;

        let computed = Self::assemble(options, read);
        if !defer {
            computed.inner.evaluate_immediate(false)?;
        }
        Ok(computed)
    }

    fn assemble(options: ComputedOptions<T>, read: ReadFn<T>) -> Self {
        let ComputedOptions {
            write,
            equality,
            evaluation,
            timer,
            deferred,
            ..
        } = options;

        let inner = ComputedInner {
            id: SubscribableId::new(),
            state: RefCell::new(NodeState {
                latest_value: None,
                is_stale: true,
                is_being_evaluated: false,
                is_disposed: false,
                read: Some(read),
                dependency_tracking: IndexMap::new(),
                dependencies_count: 0,
            }),
            write,
            equality,
            subscribable: Subscribable::new(),
            scheduler: RefCell::new(EvaluationScheduler::new(
                evaluation.throttle_evaluation,
                timer,
                deferred,
            )),
        };

        Self {
            inner: Rc::new(inner),
        }
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> SubscribableId {
        self.inner.id
    }

    /// Read the value, evaluating first if stale.
    ///
    /// Registers this computed as a dependency of the evaluation currently in
    /// progress, if any.
    pub fn try_get(&self) -> Result<T> {
        if DependencyDetection::is_active() {
            DependencyDetection::register(&self.trackable());
        }

        let is_stale = self.inner.state.borrow().is_stale;
        if is_stale {
            self.inner.evaluate_immediate(false)?;
        }

        self.inner.latest().ok_or(ComputedError::Uninitialized)
    }

    /// Read the value, evaluating first if stale.
    ///
    /// # Panics
    ///
    /// Panics if evaluation fails or no value has been produced yet. Use
    /// [`try_get`](Self::try_get) to handle those cases.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(error) => panic!("failed to read computed {}: {error}", self.inner.id),
        }
    }

    /// Forward `value` to the write function. Returns `self` for chaining.
    pub fn write(&self, value: T) -> Result<&Self> {
        let write = self.inner.write.as_ref().ok_or(ComputedError::NotWritable)?;
        write(value)?;
        Ok(self)
    }

    /// Whether a write function was configured.
    pub fn has_write_function(&self) -> bool {
        self.inner.write.is_some()
    }

    /// Latest value without registering a dependency.
    ///
    /// Only evaluates when the node is stale and has no dependencies, which
    /// covers deferred first evaluation. A stale node that is still
    /// subscribed keeps its cached value.
    pub fn try_peek(&self) -> Result<Option<T>> {
        let needs_evaluation = {
            let state = self.inner.state.borrow();
            state.is_stale && state.dependencies_count == 0
        };
        if needs_evaluation {
            self.inner.evaluate_immediate(false)?;
        }
        Ok(self.inner.latest())
    }

    /// Like [`try_peek`](Self::try_peek), but logs an evaluation failure and
    /// returns the cached value.
    pub fn peek(&self) -> Option<T> {
        match self.try_peek() {
            Ok(value) => value,
            Err(error) => {
                warn!(computed = %self.inner.id, %error, "peek evaluation failed");
                self.inner.latest()
            }
        }
    }

    /// Whether the computed can still change.
    pub fn is_active(&self) -> bool {
        let state = self.inner.state.borrow();
        state.is_stale || state.dependencies_count > 0
    }

    /// Release every dependency and stop evaluating. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Whether the computed has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.state.borrow().is_disposed
    }

    /// Whether the cached value may be out of date.
    pub fn is_stale(&self) -> bool {
        self.inner.state.borrow().is_stale
    }

    /// Number of upstreams read during the most recent evaluation.
    pub fn dependencies_count(&self) -> usize {
        self.inner.state.borrow().dependencies_count
    }

    /// Upstream IDs in the order they were first read during the most
    /// recent evaluation.
    pub fn dependency_ids(&self) -> Vec<SubscribableId> {
        let state = self.inner.state.borrow();
        let mut ids: Vec<(usize, SubscribableId)> = state
            .dependency_tracking
            .iter()
            .map(|(id, record)| (record.order(), *id))
            .collect();
        ids.sort_unstable();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Subscription held for `upstream`, if it is a current dependency.
    pub fn dependency_subscription(&self, upstream: SubscribableId) -> Option<SubscriptionId> {
        self.inner
            .state
            .borrow()
            .dependency_tracking
            .get(&upstream)
            .map(DependencyRecord::subscription_id)
    }

    /// Whether any dependency published a change since it was last tracked.
    pub fn have_dependencies_changed(&self) -> bool {
        self.inner
            .state
            .borrow()
            .dependency_tracking
            .values()
            .any(DependencyRecord::has_changed)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ComputedState {
        let state = self.inner.state.borrow();
        if state.is_disposed {
            ComputedState::Disposed
        } else if state.is_being_evaluated {
            ComputedState::Evaluating
        } else if self.inner.scheduler.borrow().has_pending() {
            ComputedState::Pending
        } else if state.is_stale && state.latest_value.is_none() {
            ComputedState::Deferred
        } else if state.is_stale {
            ComputedState::Stale
        } else {
            ComputedState::Fresh
        }
    }

    /// Evaluate now and publish a `Change` if the value differs.
    ///
    /// This is what a deferred-evaluation hook calls once its delay is over.
    pub fn refresh(&self) -> Result<()> {
        self.inner.evaluate_immediate(true)
    }

    /// Route the node through its deferred-evaluation hook, if one is
    /// installed and the node is not evaluating.
    pub fn mark_dirty(&self) {
        let hook = self.inner.scheduler.borrow().deferred();
        let is_being_evaluated = self.inner.state.borrow().is_being_evaluated;
        if let (Some(hook), false) = (hook, is_being_evaluated) {
            self.inner.defer_to(&hook);
        }
    }

    /// Install or replace the deferred-evaluation hook.
    pub fn set_deferred_evaluation<F>(&self, hook: F)
    where
        F: Fn(&Computed<T>) + 'static,
    {
        let hook: DeferredFn<T> = Rc::new(hook);
        self.inner.scheduler.borrow_mut().set_deferred(Some(hook));
    }

    /// Remove the deferred-evaluation hook.
    pub fn clear_deferred_evaluation(&self) {
        self.inner.scheduler.borrow_mut().set_deferred(None);
    }

    /// Change the throttle window. `None` or zero disables throttling.
    ///
    /// A throttle only takes effect on a node built with a timer host;
    /// otherwise changes keep evaluating without delay.
    pub fn set_throttle_evaluation(&self, delay: Option<Duration>) {
        let mut scheduler = self.inner.scheduler.borrow_mut();
        scheduler.set_throttle(delay);
        if scheduler.throttle().is_some() && !scheduler.has_timer() {
            warn!(computed = %self.inner.id, "throttle ignored: no timer host configured");
        }
    }

    /// Current throttle window, if throttling is enabled.
    pub fn throttle_evaluation(&self) -> Option<Duration> {
        self.inner.scheduler.borrow().throttle()
    }

    /// Register a handler for `event`.
    pub fn subscribe<F>(&self, event: Event, handler: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        self.inner.subscribable.subscribe(event, handler)
    }

    /// Publish `value` to this computed's subscribers.
    pub fn notify_subscribers(&self, value: &T, event: Event) {
        self.inner.subscribable.notify_subscribers(value, event);
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.inner.subscribable.version()
    }

    /// Whether a change was published since `since`.
    pub fn has_changed(&self, since: u64) -> bool {
        self.inner.subscribable.has_changed(since)
    }

    /// Number of handlers registered for `event`.
    pub fn subscriber_count(&self, event: Event) -> usize {
        self.inner.subscribable.subscriber_count(event)
    }

    /// Type-erased handle used for dependency tracking.
    pub fn trackable(&self) -> Rc<dyn Trackable> {
        self.inner.clone()
    }
}

impl<T> ComputedInner<T>
where
    T: Clone + 'static,
{
    fn latest(&self) -> Option<T> {
        self.state.borrow().latest_value.clone()
    }

    /// Evaluate, logging instead of returning a failure. Used where no
    /// caller can receive the error.
    fn evaluate_logged(self: &Rc<Self>, notify_change: bool) {
        if let Err(error) = self.evaluate_immediate(notify_change) {
            warn!(computed = %self.id, %error, "evaluation failed");
        }
    }

    fn evaluate_immediate(self: &Rc<Self>, notify_change: bool) -> Result<()> {
        {
            let state = self.state.borrow();
            if state.is_being_evaluated {
                trace!(computed = %self.id, "skipping re-entrant evaluation");
                return Ok(());
            }
            if state.is_disposed {
                return Ok(());
            }
        }

        {
            let _evaluating = EvaluatingGuard::raise(self);
            self.evaluate_with_detection(notify_change)?;
        }

        let exhausted = self.state.borrow().dependencies_count == 0;
        if exhausted {
            debug!(computed = %self.id, "no dependencies left, disposing");
            self.dispose();
        }
        Ok(())
    }

    fn evaluate_with_detection(self: &Rc<Self>, notify_change: bool) -> Result<()> {
        let (read, context, is_initial) = {
            let mut state = self.state.borrow_mut();
            let Some(read) = state.read.clone() else {
                return Ok(());
            };

            // Every previous dependency starts out as a disposal candidate.
            let is_initial = state.dependencies_count == 0;
            let candidates = std::mem::take(&mut state.dependency_tracking);
            let context = Rc::new(DetectionContext {
                node: Rc::downgrade(self),
                disposal_count: Cell::new(state.dependencies_count),
                candidates: RefCell::new(candidates),
            });
            state.dependencies_count = 0;

            (read, context, is_initial)
        };

        trace!(computed = %self.id, is_initial, "evaluating");

        let new_value = {
            let collector: Rc<dyn DependencyCollector> = context.clone();
            let _cleanup = ReadCleanup {
                node: self,
                context: &context,
                scope: Some(DependencyDetection::begin(collector, is_initial)),
            };
            read()
        }?;

        let changed = {
            let state = self.state.borrow();
            state
                .latest_value
                .as_ref()
                .map_or(true, |latest| !(self.equality)(latest, &new_value))
        };

        if changed {
            let previous = self.latest();
            if let Some(previous) = previous {
                self.subscribable
                    .notify_subscribers(&previous, Event::BeforeChange);
            }

            self.state.borrow_mut().latest_value = Some(new_value.clone());

            if notify_change {
                self.subscribable.notify_subscribers(&new_value, Event::Change);
            }
        }

        if is_initial {
            let settled = self.latest();
            if let Some(settled) = settled {
                self.subscribable.notify_subscribers(&settled, Event::Awake);
            }
        }

        Ok(())
    }

    fn subscribe_to_dependency(self: &Rc<Self>, source: &Rc<dyn Trackable>) -> DependencyRecord {
        let node = Rc::downgrade(self);
        let subscription = source.subscribe_to_changes(Rc::new(move || {
            if let Some(node) = node.upgrade() {
                node.evaluate_possibly_async();
            }
        }));

        debug!(computed = %self.id, upstream = %source.id(), "subscribed to dependency");
        DependencyRecord::new(source, subscription)
    }

    fn add_dependency_tracking(
        &self,
        id: SubscribableId,
        source: &Rc<dyn Trackable>,
        mut record: DependencyRecord,
    ) {
        let version = source.version();
        let mut state = self.state.borrow_mut();
        record.track(version, state.dependencies_count);
        state.dependency_tracking.insert(id, record);
        state.dependencies_count += 1;
    }

    fn evaluate_possibly_async(self: &Rc<Self>) {
        let schedule = self.scheduler.borrow().decide();
        match schedule {
            Schedule::Throttle(delay, timer) => self.schedule_throttled(delay, &timer),
            Schedule::Deferred(hook) => self.defer_to(&hook),
            Schedule::Immediate => self.evaluate_logged(true),
        }
    }

    fn schedule_throttled(self: &Rc<Self>, delay: Duration, timer: &Rc<dyn TimerHost>) {
        let superseded = self.scheduler.borrow_mut().take_pending();
        if let Some(superseded) = superseded {
            trace!(computed = %self.id, "superseding throttled evaluation");
            superseded.cancel();
        }

        let node = Rc::downgrade(self);
        let handle = timer.set_timeout(
            delay,
            Box::new(move || {
                if let Some(node) = node.upgrade() {
                    node.run_throttled();
                }
            }),
        );

        self.scheduler.borrow_mut().set_pending(handle);
    }

    fn run_throttled(self: &Rc<Self>) {
        let fired = self.scheduler.borrow_mut().take_pending();
        if let Some(fired) = fired {
            fired.detach();
        }
        self.evaluate_logged(true);
    }

    fn defer_to(self: &Rc<Self>, hook: &DeferredFn<T>) {
        {
            let mut state = self.state.borrow_mut();
            if state.is_disposed {
                return;
            }
            state.is_stale = true;
        }
        hook(&Computed {
            inner: Rc::clone(self),
        });
    }

    fn dispose(&self) {
        let (records, read, was_disposed) = {
            let mut state = self.state.borrow_mut();
            let was_disposed = state.is_disposed;
            let records = std::mem::take(&mut state.dependency_tracking);
            state.dependencies_count = 0;
            state.is_disposed = true;
            state.is_stale = false;
            (records, state.read.take(), was_disposed)
        };
        let pending = self.scheduler.borrow_mut().take_pending();

        if !was_disposed {
            debug!(computed = %self.id, dependencies = records.len(), "disposing computed");
        }

        for record in records.values() {
            record.dispose();
        }
        if let Some(pending) = pending {
            pending.cancel();
        }

        // Dropped last: the closure may own handles whose drop reaches back
        // into this node.
        drop(records);
        drop(read);
    }
}

impl<T: 'static> Trackable for ComputedInner<T> {
    fn id(&self) -> SubscribableId {
        self.id
    }

    fn version(&self) -> u64 {
        self.subscribable.version()
    }

    fn subscribe_to_changes(&self, handler: Rc<dyn Fn()>) -> Subscription {
        self.subscribable.subscribe(Event::Change, move |_| handler())
    }
}

// ----------------------------------------------------------------------------
// Evaluation internals
// ----------------------------------------------------------------------------

/// Collector for one evaluation: reconciles reads against the previous
/// dependency set.
struct DetectionContext<T: 'static> {
    node: Weak<ComputedInner<T>>,
    candidates: RefCell<IndexMap<SubscribableId, DependencyRecord>>,
    disposal_count: Cell<usize>,
}

impl<T: Clone + 'static> DependencyCollector for DetectionContext<T> {
    fn on_dependency(&self, source: &Rc<dyn Trackable>) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        if node.state.borrow().is_disposed {
            return;
        }

        let id = source.id();
        let retained = if self.disposal_count.get() > 0 {
            self.candidates.borrow_mut().swap_remove(&id)
        } else {
            None
        };

        match retained {
            Some(record) => {
                self.disposal_count.set(self.disposal_count.get() - 1);
                node.add_dependency_tracking(id, source, record);
            }
            None => {
                let already_tracked = node.state.borrow().dependency_tracking.contains_key(&id);
                if !already_tracked {
                    let record = node.subscribe_to_dependency(source);
                    node.add_dependency_tracking(id, source, record);
                }
            }
        }
    }
}

/// Holds `is_being_evaluated` for the duration of one evaluation.
struct EvaluatingGuard<'a, T: 'static> {
    node: &'a ComputedInner<T>,
}

impl<'a, T: 'static> EvaluatingGuard<'a, T> {
    fn raise(node: &'a ComputedInner<T>) -> Self {
        node.state.borrow_mut().is_being_evaluated = true;
        Self { node }
    }
}

impl<T: 'static> Drop for EvaluatingGuard<'_, T> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.node.state.try_borrow_mut() {
            state.is_being_evaluated = false;
        }
    }
}

/// Runs after the read function on every exit path: ends the detection
/// scope, disposes dependencies that were not read again, clears staleness.
struct ReadCleanup<'a, T: 'static> {
    node: &'a Rc<ComputedInner<T>>,
    context: &'a DetectionContext<T>,
    scope: Option<DetectionScope>,
}

impl<T: 'static> Drop for ReadCleanup<'_, T> {
    fn drop(&mut self) {
        drop(self.scope.take());

        let unused = self.context.candidates.take();
        if !unused.is_empty() {
            debug!(
                computed = %self.node.id,
                count = unused.len(),
                "disposing dependencies no longer read"
            );
        }
        for record in unused.values() {
            record.dispose();
        }
        drop(unused);

        if let Ok(mut state) = self.node.state.try_borrow_mut() {
            state.is_stale = false;
        }
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("latest_value", &state.latest_value)
            .field("is_stale", &state.is_stale)
            .field("is_disposed", &state.is_disposed)
            .field("dependencies_count", &state.dependencies_count)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
