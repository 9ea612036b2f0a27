//! Reactive Primitives
//!
//! This module implements the computed-value engine: observables, computed
//! nodes, and the dependency-detection context that connects them.
//!
//! # Concepts
//!
//! ## Observables
//!
//! An Observable is a container for mutable state. When its value is read
//! inside a detection scope (a computed evaluation), it reports itself to
//! that scope. When its value changes, subscribers are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It discovers its
//! dependencies by running its read function, re-evaluates when one of them
//! changes, and reconciles the dependency set after every run: upstreams no
//! longer read are released, new ones are subscribed, the rest are kept.
//!
//! ## Scheduling
//!
//! Re-evaluation after a change is immediate by default. A throttle window
//! debounces bursts of changes through a [`TimerHost`]; a deferred hook
//! hands timing to the host entirely.
//!
//! # Implementation Notes
//!
//! The system is single-threaded. Nodes are `Rc`-based and `!Send`; the
//! detection context is a thread-local stack of frames, so nested
//! evaluations each report to their own scope.

mod computed;
mod context;
mod dependency;
mod observable;
mod options;
mod scheduler;
mod subscribable;
mod subscriber;
mod timer;

pub use computed::{Computed, ComputedState};
pub use context::{DependencyCollector, DependencyDetection, DetectionScope};
pub use dependency::DependencyRecord;
pub use observable::Observable;
pub use options::{ComputedOptions, EvaluationOptions};
pub use subscribable::{Event, Subscribable, Trackable};
pub use subscriber::{SubscribableId, Subscription, SubscriptionId};
pub use timer::{ManualTimer, TimerCallback, TimerHandle, TimerHost, TokioTimer};
