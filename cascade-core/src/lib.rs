//! Cascade Core
//!
//! This crate provides a computed-value engine: cached derived values that
//! discover their own dependencies and keep them up to date.
//!
//! It implements:
//!
//! - Observables and computed nodes with dynamic dependency detection
//! - Mark-and-sweep reconciliation of dependencies after each evaluation
//! - Lazy, throttled, and host-deferred re-evaluation
//! - Self-disposal of computeds that can no longer change
//!
//! # Architecture
//!
//! - `reactive`: observables, computeds, the detection context, and timers
//! - `error`: the crate-wide error type
//!
//! # Example
//!
//! ```rust
//! use cascade_core::reactive::{Computed, Observable};
//!
//! let first = Observable::new(String::from("Ada"));
//! let last = Observable::new(String::from("Lovelace"));
//!
//! let full = Computed::new({
//!     let (first, last) = (first.clone(), last.clone());
//!     move || format!("{} {}", first.get(), last.get())
//! });
//!
//! assert_eq!(full.get(), "Ada Lovelace");
//! first.set(String::from("Augusta"));
//! assert_eq!(full.get(), "Augusta Lovelace");
//! ```

pub mod reactive;

mod error;

pub use error::{BoxError, ComputedError, Result};
