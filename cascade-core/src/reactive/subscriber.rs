//! Identity and subscription handles for the reactive system.
//!
//! Every readable value (observable or computed) gets a `SubscribableId`
//! when created. Computed nodes key their dependency records by it, which is
//! how a node knows it already holds a subscription to an upstream.
//!
//! A `Subscription` is the disposer returned by `subscribe`. Disposing it (or
//! dropping it) removes the handler from the upstream's subscriber list.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscribable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscribableId(u64);

impl SubscribableId {
    /// Generate a new unique subscribable ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscribableId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscribableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unique identifier for one subscription.
///
/// Two subscriptions to the same upstream always have different IDs, so
/// comparing IDs tells whether a subscription was kept or recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Generate a new unique subscription ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a live subscription.
///
/// The disposer runs at most once: on the first call to [`dispose`] or when
/// the handle is dropped, whichever comes first.
///
/// [`dispose`]: Subscription::dispose
pub struct Subscription {
    id: SubscriptionId,
    disposer: RefCell<Option<Box<dyn FnOnce()>>>,
    disposed: Cell<bool>,
}

impl Subscription {
    /// Create a subscription whose disposer runs `dispose`.
    pub fn new<F>(id: SubscriptionId, dispose: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            id,
            disposer: RefCell::new(Some(Box::new(dispose))),
            disposed: Cell::new(false),
        }
    }

    /// Get the subscription's unique ID.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Cancel the subscription. Calling this more than once is a no-op.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        // Release the borrow before running the disposer.
        let disposer = self.disposer.borrow_mut().take();
        if let Some(disposer) = disposer {
            disposer();
        }
    }

    /// Check whether the subscription has been cancelled.
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
