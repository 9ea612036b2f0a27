//! Error types for the reactive engine.

use std::error::Error as StdError;

/// Boxed error produced by a fallible read function.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by computed nodes and their configuration.
#[derive(Debug, thiserror::Error)]
pub enum ComputedError {
    /// The node was configured without a read function.
    #[error("invalid computed configuration: {0}")]
    InvalidConfiguration(&'static str),

    /// A value was written to a computed that has no write function.
    #[error(
        "cannot write a value to a computed unless a write function is configured; \
         to read the current value, call `get` instead"
    )]
    NotWritable,

    /// The read function failed during evaluation.
    #[error("read function failed: {0}")]
    Read(#[source] BoxError),

    /// The owner the read/write functions run against has been dropped.
    #[error("the computed's owner has been released")]
    OwnerReleased,

    /// The node has never produced a value.
    #[error("the computed has not produced a value yet")]
    Uninitialized,

    /// Evaluation options could not be parsed.
    #[error("invalid evaluation options: {0}")]
    Config(#[from] serde_json::Error),
}

impl ComputedError {
    /// Wrap an arbitrary read failure.
    pub fn read<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Read(error.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = ComputedError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_keeps_source() {
        let err = ComputedError::read("division by zero");
        assert_eq!(err.to_string(), "read function failed: division by zero");
        assert!(err.source().is_some());
    }

    #[test]
    fn not_writable_message_mentions_write_function() {
        let message = ComputedError::NotWritable.to_string();
        assert!(message.contains("write function"));
    }
}
