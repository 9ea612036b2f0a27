//! Dependency Detection Context
//!
//! The detection context tracks which computation is currently evaluating.
//! This enables automatic dependency tracking: when a value is read, it
//! reports itself to the innermost active scope, and that scope's collector
//! decides what to do with it (a computed node subscribes to it).
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Beginning a scope pushes a frame
//! and returns a guard; dropping the guard pops it. Frames nest, so a
//! computed that reads another computed during its own evaluation only ever
//! reports to the innermost scope.
//!
//! A frame without a collector suppresses tracking. `ignore` uses that to
//! run code that reads values without making them dependencies.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::subscribable::Trackable;

/// Receives every value read inside a detection scope.
pub trait DependencyCollector {
    /// Called once per read of `source` while the scope is innermost.
    fn on_dependency(&self, source: &Rc<dyn Trackable>);
}

thread_local! {
    static FRAME_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
    static NEXT_TOKEN: Cell<u64> = const { Cell::new(0) };
}

/// An entry in the detection stack.
struct Frame {
    /// Identifies the scope guard that owns this frame.
    token: u64,
    /// Receiver for reads. `None` while dependencies are ignored.
    collector: Option<Rc<dyn DependencyCollector>>,
    /// Whether the evaluating computed had no dependencies before this run.
    is_initial: bool,
}

/// Entry points of the dependency-detection context.
pub struct DependencyDetection;

impl DependencyDetection {
    /// Open a scope that forwards every registered read to `collector`.
    ///
    /// The scope ends when the returned guard is dropped.
    pub fn begin(collector: Rc<dyn DependencyCollector>, is_initial: bool) -> DetectionScope {
        DetectionScope::push(Some(collector), is_initial)
    }

    /// Report that `source` was read.
    ///
    /// This is a no-op when no scope is active or when the innermost scope
    /// ignores dependencies.
    pub fn register(source: &Rc<dyn Trackable>) {
        // Clone the collector out so the stack is not borrowed while it runs:
        // collectors subscribe to upstreams, which may evaluate other nodes.
        let collector = FRAME_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|frame| frame.collector.clone())
        });

        if let Some(collector) = collector {
            collector.on_dependency(source);
        }
    }

    /// Run `f` without tracking any value it reads.
    pub fn ignore<R>(f: impl FnOnce() -> R) -> R {
        let _scope = DetectionScope::push(None, false);
        f()
    }

    /// Check if reads are currently being collected.
    pub fn is_active() -> bool {
        FRAME_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|frame| frame.collector.is_some())
        })
    }

    /// Whether the innermost evaluation is its computed's first.
    pub fn is_initial() -> bool {
        FRAME_STACK.with(|stack| stack.borrow().last().is_some_and(|frame| frame.is_initial))
    }

    /// Current nesting depth of detection scopes.
    pub fn depth() -> usize {
        FRAME_STACK.with(|stack| stack.borrow().len())
    }
}

/// Guard that pops its frame when dropped.
///
/// This keeps the stack balanced even if the read function panics.
#[must_use = "the detection scope ends as soon as the guard is dropped"]
pub struct DetectionScope {
    token: u64,
}

impl DetectionScope {
    fn push(collector: Option<Rc<dyn DependencyCollector>>, is_initial: bool) -> Self {
        let token = NEXT_TOKEN.with(|next| {
            let token = next.get();
            next.set(token.wrapping_add(1));
            token
        });

        FRAME_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                token,
                collector,
                is_initial,
            });
        });

        Self { token }
    }
}

impl Drop for DetectionScope {
    fn drop(&mut self) {
        // `try_with` because the thread-local may already be gone when a
        // scope outlives it during thread teardown.
        let _ = FRAME_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(frame) = popped {
                debug_assert_eq!(
                    frame.token, self.token,
                    "DetectionScope mismatch: expected token {}, got {}",
                    self.token, frame.token
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::{SubscribableId, Subscription, SubscriptionId};

    struct Source {
        id: SubscribableId,
    }

    impl Trackable for Source {
        fn id(&self) -> SubscribableId {
            self.id
        }

        fn version(&self) -> u64 {
            0
        }

        fn subscribe_to_changes(&self, _handler: Rc<dyn Fn()>) -> Subscription {
            Subscription::new(SubscriptionId::new(), || {})
        }
    }

    fn source() -> Rc<dyn Trackable> {
        Rc::new(Source {
            id: SubscribableId::new(),
        })
    }

    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<SubscribableId>>,
    }

    impl DependencyCollector for Recorder {
        fn on_dependency(&self, source: &Rc<dyn Trackable>) {
            self.seen.borrow_mut().push(source.id());
        }
    }

    #[test]
    fn register_without_scope_is_noop() {
        assert!(!DependencyDetection::is_active());
        DependencyDetection::register(&source());
        assert_eq!(DependencyDetection::depth(), 0);
    }

    #[test]
    fn scope_collects_reads() {
        let recorder = Rc::new(Recorder::default());
        let a = source();
        let b = source();

        {
            let _scope = DependencyDetection::begin(recorder.clone(), true);
            assert!(DependencyDetection::is_active());
            assert!(DependencyDetection::is_initial());

            DependencyDetection::register(&a);
            DependencyDetection::register(&b);
        }

        // Scope should be cleaned up after drop
        assert!(!DependencyDetection::is_active());
        assert_eq!(*recorder.seen.borrow(), vec![a.id(), b.id()]);
    }

    #[test]
    fn nested_scopes_report_to_innermost() {
        let outer = Rc::new(Recorder::default());
        let inner = Rc::new(Recorder::default());
        let a = source();
        let b = source();
        let c = source();

        {
            let _outer = DependencyDetection::begin(outer.clone(), false);
            DependencyDetection::register(&a);

            {
                let _inner = DependencyDetection::begin(inner.clone(), true);
                DependencyDetection::register(&b);
                assert_eq!(DependencyDetection::depth(), 2);
            }

            // After inner scope drops, outer should be current
            DependencyDetection::register(&c);
            assert!(!DependencyDetection::is_initial());
        }

        assert_eq!(*outer.seen.borrow(), vec![a.id(), c.id()]);
        assert_eq!(*inner.seen.borrow(), vec![b.id()]);
    }

    #[test]
    fn ignore_suppresses_tracking() {
        let recorder = Rc::new(Recorder::default());
        let a = source();

        let _scope = DependencyDetection::begin(recorder.clone(), false);
        let value = DependencyDetection::ignore(|| {
            assert!(!DependencyDetection::is_active());
            DependencyDetection::register(&a);
            5
        });

        assert_eq!(value, 5);
        assert!(DependencyDetection::is_active());
        assert!(recorder.seen.borrow().is_empty());
    }
}
