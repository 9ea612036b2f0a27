//! Subscribable Implementation
//!
//! The base publish/subscribe primitive shared by observables and computed
//! nodes. It keeps an ordered list of handlers per event and a version number
//! that moves forward on every `Change` notification.
//!
//! # Versions
//!
//! A dependent records the upstream version when it subscribes. Comparing that
//! against the current version later (`has_changed`) tells whether the
//! upstream published a change in between, without looking at the value.
//!
//! # Re-entrancy
//!
//! Notification snapshots the handler list before calling anything, so a
//! handler may subscribe, dispose its own subscription, or trigger a nested
//! notification on the same subscribable. A handler disposed after the
//! snapshot was taken is skipped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::subscriber::{SubscribableId, Subscription, SubscriptionId};

/// Named notification events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// The value changed. Carries the new value and bumps the version.
    Change,

    /// The value is about to change. Carries the old value.
    BeforeChange,

    /// A computed finished its first evaluation. Carries the settled value.
    Awake,
}

type Handler<T> = Rc<dyn Fn(&T)>;

struct Entry<T> {
    id: SubscriptionId,
    event: Event,
    handler: Handler<T>,
    /// Cleared by the disposer.
    alive: Rc<Cell<bool>>,
}

struct Registry<T> {
    entries: RefCell<SmallVec<[Entry<T>; 4]>>,
    version: Cell<u64>,
}

impl<T> Registry<T> {
    fn remove(&self, id: SubscriptionId) {
        self.entries.borrow_mut().retain(|entry| entry.id != id);
    }
}

/// A versioned list of event handlers.
pub struct Subscribable<T> {
    registry: Rc<Registry<T>>,
}

impl<T: 'static> Subscribable<T> {
    /// Create an empty subscribable at version zero.
    pub fn new() -> Self {
        Self {
            registry: Rc::new(Registry {
                entries: RefCell::new(SmallVec::new()),
                version: Cell::new(0),
            }),
        }
    }

    /// Register `handler` for `event`.
    ///
    /// Handlers for the same event run in the order they subscribed. The
    /// returned subscription removes the handler when disposed or dropped.
    pub fn subscribe<F>(&self, event: Event, handler: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        let id = SubscriptionId::new();
        let alive = Rc::new(Cell::new(true));
        self.registry.entries.borrow_mut().push(Entry {
            id,
            event,
            handler: Rc::new(handler),
            alive: Rc::clone(&alive),
        });

        let registry: Weak<Registry<T>> = Rc::downgrade(&self.registry);
        Subscription::new(id, move || {
            alive.set(false);
            if let Some(registry) = registry.upgrade() {
                registry.remove(id);
            }
        })
    }

    /// Deliver `value` to every handler registered for `event`.
    pub fn notify_subscribers(&self, value: &T, event: Event) {
        if event == Event::Change {
            self.update_version();
        }

        let handlers: SmallVec<[(Rc<Cell<bool>>, Handler<T>); 4]> = self
            .registry
            .entries
            .borrow()
            .iter()
            .filter(|entry| entry.event == event)
            .map(|entry| (Rc::clone(&entry.alive), Rc::clone(&entry.handler)))
            .collect();

        for (alive, handler) in handlers {
            // An earlier handler in this round may have disposed it.
            if alive.get() {
                handler(value);
            }
        }
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.registry.version.get()
    }

    /// Whether a change was published since `since`.
    pub fn has_changed(&self, since: u64) -> bool {
        self.version() != since
    }

    /// Move the version forward without notifying anyone.
    pub fn update_version(&self) {
        let registry = &self.registry;
        registry.version.set(registry.version.get().wrapping_add(1));
    }

    /// Number of handlers registered for `event`.
    pub fn subscriber_count(&self, event: Event) -> usize {
        self.registry
            .entries
            .borrow()
            .iter()
            .filter(|entry| entry.event == event)
            .count()
    }
}

impl<T: 'static> Default for Subscribable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Subscribable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribable")
            .field("version", &self.registry.version.get())
            .field("subscribers", &self.registry.entries.borrow().len())
            .finish()
    }
}

/// A readable value that computed nodes can depend on.
///
/// This is the type-erased view the dependency-detection context hands to a
/// computed: enough to key, version, and subscribe to the upstream without
/// knowing its value type.
pub trait Trackable {
    /// Stable identity of the upstream.
    fn id(&self) -> SubscribableId;

    /// Current version of the upstream.
    fn version(&self) -> u64;

    /// Whether the upstream published a change since `since`.
    fn has_changed(&self, since: u64) -> bool {
        self.version() != since
    }

    /// Invoke `handler` on every `Change` notification.
    fn subscribe_to_changes(&self, handler: Rc<dyn Fn()>) -> Subscription;
}
