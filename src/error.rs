//! Error types for the dispatch pipeline
use std::time::Duration;

/// Boxed error produced by a transport.
pub use tower::BoxError;

/// Error surfaced by every stage of the pipeline.
///
/// All wrappers share this one error type so they can be stacked in any order.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The terminal call failed before a response was received.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
    /// A pooled client failed to perform the request.
    #[error("pooled client request failed: {0}")]
    Dispatch(#[source] BoxError),
}

impl Error {
    /// Wrap any error as a transport failure.
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Transport(err.into())
    }

    /// Check if this error came straight from the transport
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check if this error came from a pooled client
    pub fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch(_))
    }

    /// Unwrap the underlying transport error.
    pub fn into_source(self) -> BoxError {
        match self {
            Self::Transport(e) | Self::Dispatch(e) => e,
        }
    }
}

/// Returned by [`AdmissionQueue::enqueue`](crate::rate_limit::AdmissionQueue::enqueue) when
/// every slot is occupied.
///
/// Never reaches the pipeline caller; the rate limiter treats it as "pause and try again".
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("admission queue is full ({capacity} slots)")]
pub struct QueueFull {
    /// Capacity of the queue that rejected the entry.
    pub capacity: usize,
}

/// Errors produced while building layers and recorders.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// An admission queue needs at least one slot.
    #[error("admission queue capacity must be > 0")]
    ZeroCapacity,
    /// Timestamps cannot be truncated to a zero-length window.
    #[error("window granularity must be > 0 (got {0:?})")]
    ZeroGranularity(Duration),
    /// A withdrawal threshold of zero would drop every handle before its first call.
    #[error("failure_threshold must be > 0")]
    ZeroFailureThreshold,
}
