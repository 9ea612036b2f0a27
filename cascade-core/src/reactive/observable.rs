//! Observable Implementation
//!
//! An Observable is the writable leaf of the reactive graph. It holds a
//! value, reports reads to the dependency-detection context, and publishes
//! changes through its `Subscribable`.
//!
//! # How Observables Work
//!
//! 1. `get` inside a detection scope registers the observable with the
//!    innermost scope, so the evaluating computed subscribes to it.
//!
//! 2. `set` compares the new value with the current one. Equal values are
//!    dropped silently. Otherwise subscribers see `BeforeChange` with the old
//!    value, then `Change` with the new one.
//!
//! # Memory Layout
//!
//! Cloning an `Observable` clones a handle; all clones share one value and
//! one subscriber list.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::context::DependencyDetection;
use super::subscribable::{Event, Subscribable, Trackable};
use super::subscriber::{SubscribableId, Subscription};

type EqualityFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

struct ObservableInner<T> {
    id: SubscribableId,
    value: RefCell<T>,
    subscribable: Subscribable<T>,
    equality: EqualityFn<T>,
}

/// A reactive value holder.
///
/// # Example
///
/// ```rust
/// use cascade_core::reactive::Observable;
///
/// let count = Observable::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Observable<T: 'static> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Observable<T>
where
    T: Clone + 'static,
{
    /// Create a new observable that suppresses writes of equal values.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equality(value, |a: &T, b: &T| a == b)
    }

    /// Create a new observable with a custom equality comparer.
    pub fn with_equality<F>(value: T, equality: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            inner: Rc::new(ObservableInner {
                id: SubscribableId::new(),
                value: RefCell::new(value),
                subscribable: Subscribable::new(),
                equality: Rc::new(equality),
            }),
        }
    }

    /// Get the observable's unique ID.
    pub fn id(&self) -> SubscribableId {
        self.inner.id
    }

    /// Get the current value, registering a dependency if a scope is active.
    pub fn get(&self) -> T {
        if DependencyDetection::is_active() {
            DependencyDetection::register(&self.trackable());
        }
        self.peek()
    }

    /// Type-erased handle used for dependency tracking.
    pub fn trackable(&self) -> Rc<dyn Trackable> {
        self.inner.clone()
    }

    /// Get the current value without tracking.
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Set a new value and notify subscribers if it differs.
    pub fn set(&self, value: T) {
        let previous = self.peek();
        if (self.inner.equality)(&previous, &value) {
            return;
        }

        self.inner
            .subscribable
            .notify_subscribers(&previous, Event::BeforeChange);
        *self.inner.value.borrow_mut() = value.clone();
        self.inner
            .subscribable
            .notify_subscribers(&value, Event::Change);
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let guard = self.inner.value.borrow();
            f(&*guard)
        };
        self.set(next);
    }

    /// Publish a `Change` for the current value even if nothing was set.
    pub fn value_has_mutated(&self) {
        let value = self.peek();
        self.inner
            .subscribable
            .notify_subscribers(&value, Event::Change);
    }

    /// Register a handler for `event`.
    pub fn subscribe<F>(&self, event: Event, handler: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        self.inner.subscribable.subscribe(event, handler)
    }

    /// Number of `Change` subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribable.subscriber_count(Event::Change)
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.inner.subscribable.version()
    }
}

impl<T: 'static> Trackable for ObservableInner<T> {
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

impl<T: 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Observable<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn observable_get_and_set() {
        let observable = Observable::new(0);
        assert_eq!(observable.get(), 0);

        observable.set(42);
        assert_eq!(observable.get(), 42);
    }

    #[test]
    fn observable_update() {
        let observable = Observable::new(10);
        observable.update(|v| v + 5);
        assert_eq!(observable.get(), 15);
    }

    #[test]
    fn set_notifies_before_and_after() {
        let observable = Observable::new(1);
        let log = Rc::new(RefCell::new(Vec::new()));

        let _before = observable.subscribe(Event::BeforeChange, {
            let log = log.clone();
            move |v| log.borrow_mut().push(format!("before {v}"))
        });
        let _change = observable.subscribe(Event::Change, {
            let log = log.clone();
            move |v| log.borrow_mut().push(format!("change {v}"))
        });

        observable.set(2);
        assert_eq!(*log.borrow(), vec!["before 1", "change 2"]);
    }

    #[test]
    fn equal_write_is_suppressed() {
        let observable = Observable::new(3);
        let calls = Rc::new(Cell::new(0));
        let version = observable.version();

        let _subscription = observable.subscribe(Event::Change, {
            let calls = calls.clone();
            move |_| calls.set(calls.get() + 1)
        });

        observable.set(3);
        assert_eq!(calls.get(), 0);
        assert_eq!(observable.version(), version);

        observable.set(4);
        assert_eq!(calls.get(), 1);
        assert_ne!(observable.version(), version);
    }

    #[test]
    fn custom_equality_can_force_notifications() {
        let observable = Observable::with_equality(vec![1], |_, _| false);
        let calls = Rc::new(Cell::new(0));

        let _subscription = observable.subscribe(Event::Change, {
            let calls = calls.clone();
            move |_| calls.set(calls.get() + 1)
        });

        observable.set(vec![1]);
        observable.value_has_mutated();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn observable_clone_shares_state() {
        let observable1 = Observable::new(0);
        let observable2 = observable1.clone();

        observable1.set(42);
        assert_eq!(observable2.get(), 42);
        assert_eq!(observable1.id(), observable2.id());
    }
}
