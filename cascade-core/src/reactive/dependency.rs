//! Dependency records held by computed nodes.

use std::fmt;
use std::rc::{Rc, Weak};

use super::subscribable::Trackable;
use super::subscriber::{Subscription, SubscriptionId};

/// Bookkeeping for one upstream a computed currently subscribes to.
///
/// The record owns the subscription but only weakly references the
/// upstream, so a computed never keeps its sources alive.
pub struct DependencyRecord {
    target: Weak<dyn Trackable>,
    version: u64,
    order: usize,
    subscription: Subscription,
}

impl DependencyRecord {
    pub(crate) fn new(target: &Rc<dyn Trackable>, subscription: Subscription) -> Self {
        Self {
            target: Rc::downgrade(target),
            version: target.version(),
            order: 0,
            subscription,
        }
    }

    /// Refresh the observed version and discovery order.
    pub(crate) fn track(&mut self, version: u64, order: usize) {
        self.version = version;
        self.order = order;
    }

    /// Version of the upstream when this record was last tracked.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Position of the upstream in the most recent evaluation's reads.
    pub fn order(&self) -> usize {
        self.order
    }

    /// The subscription's ID. Unchanged for as long as the record survives.
    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    /// Whether the upstream published a change since it was tracked.
    ///
    /// An upstream that no longer exists cannot change again.
    pub fn has_changed(&self) -> bool {
        self.target
            .upgrade()
            .is_some_and(|target| target.has_changed(self.version))
    }

    /// Cancel the subscription.
    pub fn dispose(&self) {
        self.subscription.dispose();
    }

    /// Whether the subscription has been cancelled.
    pub fn is_disposed(&self) -> bool {
        self.subscription.is_disposed()
    }
}

impl fmt::Debug for DependencyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyRecord")
            .field("version", &self.version)
            .field("order", &self.order)
            .field("subscription", &self.subscription)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observable;

    #[test]
    fn record_detects_upstream_change() {
        let observable = Observable::new(1);
        let target = observable.trackable();
        let record = DependencyRecord::new(&target, target.subscribe_to_changes(Rc::new(|| {})));

        assert!(!record.has_changed());
        observable.set(2);
        assert!(record.has_changed());
    }

    #[test]
    fn dispose_releases_upstream_subscription() {
        let observable = Observable::new(1);
        let target = observable.trackable();
        let record = DependencyRecord::new(&target, target.subscribe_to_changes(Rc::new(|| {})));
        assert_eq!(observable.subscriber_count(), 1);

        record.dispose();
        assert!(record.is_disposed());
        assert_eq!(observable.subscriber_count(), 0);
    }

    #[test]
    fn dropped_upstream_never_reports_change() {
        let observable = Observable::new(1);
        let target = observable.trackable();
        let record = DependencyRecord::new(&target, target.subscribe_to_changes(Rc::new(|| {})));

        drop(target);
        drop(observable);
        assert!(!record.has_changed());
    }
}
