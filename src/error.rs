//! Error types surfaced at the public API boundary (spec.md §7). None of
//! these are retried internally; the caller decides how to recover. Misuse
//! categories (double-destroy, use-after-destroy, dtor panics, expired
//! epochs in a traversal) are undefined behavior, documented on the
//! relevant methods, not represented here.

use std::fmt;

/// Failure to construct a [`crate::Proxy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateError {
    /// `Config::queue_size` was zero.
    InvalidQueueSize,
    /// `Config::cachesize` was not a positive power of two.
    InvalidCachesize,
    /// The aligned allocation for the proxy's epoch cell or a reader slot
    /// could not be satisfied.
    AllocationFailed,
}

impl fmt::Display for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateError::InvalidQueueSize => write!(f, "queue_size must be at least 1"),
            CreateError::InvalidCachesize => write!(f, "cachesize must be a positive power of two"),
            CreateError::AllocationFailed => write!(f, "failed to allocate aligned memory"),
        }
    }
}

impl std::error::Error for CreateError {}

/// Failure to retire an object synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireError {
    /// The calling thread holds an acquired [`crate::Reference`] on this
    /// same proxy; waiting for the queue to drain would deadlock against
    /// itself, since the reference it holds is exactly what would need to
    /// release for reclamation to proceed.
    WouldDeadlock,
    /// The queue stayed full through every reclaim attempt.
    QueueFull,
}

impl fmt::Display for RetireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetireError::WouldDeadlock => {
                write!(f, "synchronous retire would deadlock against the caller's own acquired reference")
            }
            RetireError::QueueFull => write!(f, "retire queue stayed full after reclaim attempts"),
        }
    }
}

impl std::error::Error for RetireError {}
