//! Configuration for computed nodes.
//!
//! `ComputedOptions` is the builder handed to [`Computed::with_options`]. It
//! carries the user functions (read, write, equality, deferred hook), which
//! only exist in code, and an [`EvaluationOptions`] block of plain settings,
//! which can also be loaded from configuration files.
//!
//! [`Computed::with_options`]: super::Computed::with_options

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::computed::Computed;
use super::timer::TimerHost;
use crate::error::{BoxError, ComputedError, Result};

pub(crate) type ReadFn<T> = Rc<dyn Fn() -> Result<T>>;
pub(crate) type WriteFn<T> = Rc<dyn Fn(T) -> Result<()>>;
pub(crate) type EqualityFn<T> = Rc<dyn Fn(&T, &T) -> bool>;
pub(crate) type DeferredFn<T> = Rc<dyn Fn(&Computed<T>)>;

/// Timing settings for a computed node.
///
/// Serialized names follow the camelCase option names (`deferEvaluation`,
/// `throttleEvaluation`); the throttle is given in milliseconds.
///
/// ```rust
/// use std::time::Duration;
/// use cascade_core::reactive::EvaluationOptions;
///
/// let options = EvaluationOptions::from_json(r#"{ "throttleEvaluation": 25 }"#)?;
/// assert_eq!(options.throttle_evaluation, Some(Duration::from_millis(25)));
/// assert!(!options.defer_evaluation);
/// # Ok::<(), cascade_core::ComputedError>(())
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EvaluationOptions {
    /// Skip the eager first evaluation; the first read or peek runs it.
    #[serde(default)]
    pub defer_evaluation: bool,

    /// Debounce window for re-evaluation after an upstream change.
    #[serde(default, with = "duration_ms")]
    pub throttle_evaluation: Option<Duration>,
}

impl EvaluationOptions {
    /// Parse options from a JSON document.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => {
                let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                serializer.serialize_some(&millis)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

/// Builder for a computed node.
///
/// # Example
///
/// ```rust
/// use cascade_core::reactive::{Computed, ComputedOptions, Observable};
///
/// let celsius = Observable::new(20.0_f64);
/// let fahrenheit = Computed::with_options(
///     ComputedOptions::new()
///         .read({
///             let celsius = celsius.clone();
///             move || celsius.get() * 9.0 / 5.0 + 32.0
///         })
///         .write({
///             let celsius = celsius.clone();
///             move |f: f64| celsius.set((f - 32.0) * 5.0 / 9.0)
///         }),
/// )?;
///
/// fahrenheit.write(212.0)?;
/// assert_eq!(celsius.get(), 100.0);
/// # Ok::<(), cascade_core::ComputedError>(())
/// ```
pub struct ComputedOptions<T: 'static> {
    pub(crate) read: Option<ReadFn<T>>,
    pub(crate) write: Option<WriteFn<T>>,
    pub(crate) equality: EqualityFn<T>,
    pub(crate) evaluation: EvaluationOptions,
    pub(crate) timer: Option<Rc<dyn TimerHost>>,
    pub(crate) deferred: Option<DeferredFn<T>>,
}

impl<T> ComputedOptions<T>
where
    T: PartialEq + 'static,
{
    /// Empty options comparing values with `PartialEq`.
    pub fn new() -> Self {
        Self::with_equality(|a: &T, b: &T| a == b)
    }
}

impl<T> Default for ComputedOptions<T>
where
    T: PartialEq + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> ComputedOptions<T> {
    /// Empty options with a custom equality comparer, for value types
    /// without `PartialEq` or with a coarser notion of "changed".
    pub fn with_equality<F>(equality: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            read: None,
            write: None,
            equality: Rc::new(equality),
            evaluation: EvaluationOptions::default(),
            timer: None,
            deferred: None,
        }
    }

    /// Infallible read function.
    pub fn read<F>(mut self, read: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        self.read = Some(Rc::new(move || Ok(read())));
        self
    }

    /// Read function that may fail. Failures surface as
    /// [`ComputedError::Read`].
    pub fn try_read<F, E>(mut self, read: F) -> Self
    where
        F: Fn() -> std::result::Result<T, E> + 'static,
        E: Into<BoxError>,
    {
        self.read = Some(Rc::new(move || read().map_err(ComputedError::read)));
        self
    }

    /// Read function invoked against `owner`.
    ///
    /// Only a weak reference is kept; once the owner is dropped, evaluation
    /// fails with [`ComputedError::OwnerReleased`].
    pub fn read_on<O, F>(mut self, owner: &Rc<O>, read: F) -> Self
    where
        O: 'static,
        F: Fn(&O) -> T + 'static,
    {
        let owner = Rc::downgrade(owner);
        self.read = Some(Rc::new(move || {
            let owner = owner.upgrade().ok_or(ComputedError::OwnerReleased)?;
            Ok(read(&owner))
        }));
        self
    }

    /// Write function. Without one, writes fail with
    /// [`ComputedError::NotWritable`].
    pub fn write<F>(mut self, write: F) -> Self
    where
        F: Fn(T) + 'static,
    {
        self.write = Some(Rc::new(move |value| {
            write(value);
            Ok(())
        }));
        self
    }

    /// Write function invoked against `owner`, held weakly like
    /// [`read_on`](Self::read_on).
    pub fn write_on<O, F>(mut self, owner: &Rc<O>, write: F) -> Self
    where
        O: 'static,
        F: Fn(&O, T) + 'static,
    {
        let owner = Rc::downgrade(owner);
        self.write = Some(Rc::new(move |value| {
            let owner = owner.upgrade().ok_or(ComputedError::OwnerReleased)?;
            write(&owner, value);
            Ok(())
        }));
        self
    }

    /// Replace the equality comparer.
    pub fn equality<F>(mut self, equality: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        self.equality = Rc::new(equality);
        self
    }

    /// Skip the eager first evaluation.
    pub fn defer_evaluation(mut self, defer: bool) -> Self {
        self.evaluation.defer_evaluation = defer;
        self
    }

    /// Debounce re-evaluation by `delay`. A zero delay disables throttling.
    ///
    /// A positive delay needs a host from [`timer`](Self::timer);
    /// [`Computed::with_options`] rejects it otherwise with
    /// [`ComputedError::InvalidConfiguration`].
    pub fn throttle_evaluation(mut self, delay: Duration) -> Self {
        self.evaluation.throttle_evaluation = Some(delay);
        self
    }

    /// Replace all timing settings at once.
    pub fn evaluation(mut self, evaluation: EvaluationOptions) -> Self {
        self.evaluation = evaluation;
        self
    }

    /// Timer host for throttled evaluation, such as [`TokioTimer`] inside a
    /// `LocalSet` or [`ManualTimer`] for a host-driven clock.
    ///
    /// [`TokioTimer`]: super::TokioTimer
    /// [`ManualTimer`]: super::ManualTimer
    pub fn timer<H>(mut self, timer: H) -> Self
    where
        H: TimerHost + 'static,
    {
        self.timer = Some(Rc::new(timer));
        self
    }

    /// Hand the timing of change-triggered evaluation to `hook`.
    ///
    /// On each upstream change the node is marked stale and `hook` is called
    /// with it; the hook decides when to call [`Computed::refresh`]. A
    /// configured throttle takes precedence over the hook.
    pub fn deferred_evaluation<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Computed<T>) + 'static,
    {
        self.deferred = Some(Rc::new(hook));
        self
    }
}

impl<T: 'static> fmt::Debug for ComputedOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedOptions")
            .field("has_read", &self.read.is_some())
            .field("has_write", &self.write.is_some())
            .field("evaluation", &self.evaluation)
            .field("has_timer", &self.timer.is_some())
            .field("has_deferred", &self.deferred.is_some())
            .finish()
    }
}
